//! 收敛规格：待定状态集合、目标状态集合、最小轮询间隔与截止时间。
//!
//! Convergence spec.
//!
//! A [`ConvergenceSpec`] names what "still in progress" and "done" look like for one
//! watched identity, how often to look, and when to give up. It is built through
//! [`ConvergenceSpecBuilder`], which validates the invariants up front so the poller
//! never starts with overlapping sets or an unbounded deadline.
//!
//! ```rust
//! use statewait::{ConvergenceSpec, OperationContext};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> statewait::Result<()> {
//! let root = CancellationToken::new();
//! let ctx = OperationContext::with_timeout(&root, Duration::from_secs(600));
//! let spec = ConvergenceSpec::builder("feature Microsoft.Compute/InGuestPatchVMPreview")
//!     .pending(["Registering"])
//!     .target(["Registered"])
//!     .min_poll_interval(Duration::from_secs(5))
//!     .deadline_from(&ctx)
//!     .build()?;
//! assert!(spec.classify(&"REGISTERED".into()).is_target());
//! # Ok(())
//! # }
//! ```

use crate::context::OperationContext;
use crate::status::{Classification, Status, StatusSet};
use crate::{Error, ErrorContext, Result};
use std::time::Duration;
use tokio::time::Instant;

/// What to wait for and for how long.
#[derive(Debug, Clone)]
pub struct ConvergenceSpec {
    identity: String,
    pending: StatusSet,
    target: StatusSet,
    min_poll_interval: Duration,
    deadline: Instant,
    initial_delay: Duration,
    continuous_target_occurrence: u32,
}

impl ConvergenceSpec {
    pub fn builder(identity: impl Into<String>) -> ConvergenceSpecBuilder {
        ConvergenceSpecBuilder::new(identity)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn pending(&self) -> &StatusSet {
        &self.pending
    }

    pub fn target(&self) -> &StatusSet {
        &self.target
    }

    pub fn min_poll_interval(&self) -> Duration {
        self.min_poll_interval
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn continuous_target_occurrence(&self) -> u32 {
        self.continuous_target_occurrence
    }

    /// Time left before the deadline, saturating at zero.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn classify(&self, status: &Status) -> Classification {
        Classification::of(status, &self.pending, &self.target)
    }

    /// Pending and target statuses, for error messages.
    pub fn expected(&self) -> String {
        format!(
            "pending [{}], target [{}]",
            self.pending.describe(),
            self.target.describe()
        )
    }
}

/// Builder for [`ConvergenceSpec`].
#[derive(Debug, Clone)]
pub struct ConvergenceSpecBuilder {
    identity: String,
    pending: StatusSet,
    target: StatusSet,
    min_poll_interval: Duration,
    deadline: DeadlineSource,
    initial_delay: Duration,
    continuous_target_occurrence: u32,
}

#[derive(Debug, Clone)]
enum DeadlineSource {
    Unset,
    Absolute(Instant),
    /// The context had no deadline.
    Missing,
}

impl ConvergenceSpecBuilder {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            pending: StatusSet::new(),
            target: StatusSet::new(),
            min_poll_interval: Duration::from_secs(10),
            deadline: DeadlineSource::Unset,
            initial_delay: Duration::ZERO,
            continuous_target_occurrence: 1,
        }
    }

    pub fn pending<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Status>,
    {
        for s in statuses {
            self.pending.insert(s);
        }
        self
    }

    pub fn target<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Status>,
    {
        for s in statuses {
            self.target.insert(s);
        }
        self
    }

    pub fn min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = DeadlineSource::Absolute(deadline);
        self
    }

    /// Derive the deadline from the time remaining on `ctx` right now.
    pub fn deadline_from(mut self, ctx: &OperationContext) -> Self {
        self.deadline = match ctx.remaining() {
            Some(remaining) => DeadlineSource::Absolute(Instant::now() + remaining),
            None => DeadlineSource::Missing,
        };
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn continuous_target_occurrence(mut self, n: u32) -> Self {
        self.continuous_target_occurrence = n;
        self
    }

    pub fn build(self) -> Result<ConvergenceSpec> {
        let ctx = || ErrorContext::new().with_source("convergence_spec");

        let deadline = match self.deadline {
            DeadlineSource::Absolute(d) => d,
            DeadlineSource::Missing => {
                return Err(Error::configuration_with_context(
                    "context had no deadline",
                    ctx()
                        .with_field_path("context.deadline")
                        .with_details(self.identity),
                ));
            }
            DeadlineSource::Unset => {
                return Err(Error::configuration_with_context(
                    "no deadline set",
                    ctx()
                        .with_field_path("spec.deadline")
                        .with_details(self.identity),
                ));
            }
        };
        if deadline <= Instant::now() {
            return Err(Error::configuration_with_context(
                "deadline is not in the future",
                ctx()
                    .with_field_path("spec.deadline")
                    .with_details(self.identity),
            ));
        }
        if self.pending.is_empty() {
            return Err(Error::configuration_with_context(
                "pending status set is empty",
                ctx().with_field_path("spec.pending"),
            ));
        }
        if self.target.is_empty() {
            return Err(Error::configuration_with_context(
                "target status set is empty",
                ctx().with_field_path("spec.target"),
            ));
        }
        if let Some(overlap) = self.pending.intersection_with(&self.target) {
            return Err(Error::configuration_with_context(
                "status is both pending and target",
                ctx()
                    .with_field_path("spec.target")
                    .with_details(overlap.as_str()),
            ));
        }
        if self.min_poll_interval.is_zero() {
            return Err(Error::configuration_with_context(
                "minimum poll interval must be positive",
                ctx().with_field_path("spec.min_poll_interval"),
            ));
        }
        if self.continuous_target_occurrence == 0 {
            return Err(Error::configuration_with_context(
                "continuous target occurrence must be at least 1",
                ctx().with_field_path("spec.continuous_target_occurrence"),
            ));
        }

        Ok(ConvergenceSpec {
            identity: self.identity,
            pending: self.pending,
            target: self.target,
            min_poll_interval: self.min_poll_interval,
            deadline,
            initial_delay: self.initial_delay,
            continuous_target_occurrence: self.continuous_target_occurrence,
        })
    }
}
