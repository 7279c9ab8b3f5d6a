//! # statewait
//!
//! 远程资源生命周期操作的状态收敛轮询器：在截止时间内等待远程系统到达期望的终态。
//!
//! Deadline-bounded state-convergence poller for remote resource lifecycle operations.
//!
//! ## Overview
//!
//! After a mutating request against a remote management API (register a feature,
//! provision or delete a resource), the remote side keeps reporting an in-progress
//! status for a while. This crate provides one parametrized engine that samples that
//! status until it reaches an expected terminal state, and gives up cleanly otherwise.
//!
//! ## Core Semantics
//!
//! - **Target status**: converged; returned immediately
//! - **Pending status**: sleep (backoff seeded at the minimum poll interval) and probe again
//! - **Any other status**: hard stop; an unrecognized state never self-resolves
//! - **Probe failure**: surfaced on first occurrence, never silently retried
//! - **Deadline**: derived from the remaining operation budget; polling never runs past it
//! - **Cancellation**: wakes the sleep immediately and is reported distinctly from a timeout
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use statewait::probe::{probe_fn, ProbeError, StateSample};
//! use statewait::{ConvergenceSpec, OperationContext, Poller};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> statewait::Result<()> {
//!     let root = CancellationToken::new();
//!     let ctx = OperationContext::with_timeout(&root, Duration::from_secs(30 * 60));
//!
//!     // ... issue the mutating request here ...
//!
//!     let spec = ConvergenceSpec::builder("feature Microsoft.Compute/InGuestPatchVMPreview")
//!         .pending(["Registering"])
//!         .target(["Registered"])
//!         .min_poll_interval(Duration::from_secs(30))
//!         .deadline_from(&ctx)
//!         .build()?;
//!     let probe = probe_fn(|| async { Ok::<_, ProbeError>(StateSample::new((), "Registered")) });
//!
//!     let sample = Poller::default().wait(&spec, &probe, &ctx).await?;
//!     println!("converged: {}", sample.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`status`] | Case-insensitive status values, status sets, classification |
//! | [`probe`] | State samples, the refresh probe trait, probe errors |
//! | [`spec`] | Convergence spec and its validating builder |
//! | [`context`] | Per-operation deadline, cancellation, timeout budgets |
//! | [`backoff`] | Capped exponential inter-probe delay |
//! | [`poller`] | The convergence loop and its outcome |
//! | [`lifecycle`] | Feature and resource-provider callers built on the poller |

pub mod backoff;
pub mod context;
pub mod lifecycle;
pub mod poller;
pub mod probe;
pub mod spec;
pub mod status;

pub use context::{OperationContext, OperationKind, Timeouts};
pub use poller::{Outcome, Poller, PollerConfig};
pub use probe::{ProbeError, ProbeErrorKind, RefreshProbe, StateSample};
pub use spec::{ConvergenceSpec, ConvergenceSpecBuilder};
pub use status::{Classification, Status, StatusSet};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, WaitError};
