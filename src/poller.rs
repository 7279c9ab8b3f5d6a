//! 收敛轮询器：在截止时间内反复探测远程状态直至到达目标状态。
//!
//! Convergence poller.
//!
//! [`Poller::run`] drives one [`RefreshProbe`] until the reported status lands in the
//! spec's target set, leaves both sets, or the deadline passes:
//!
//! - target status: converged, returned immediately (no sleep on a first-probe hit)
//! - pending status: sleep (capped exponential backoff seeded at the minimum poll
//!   interval, clamped to the time left) and probe again
//! - any other status: hard stop with [`WaitError::UnexpectedState`]
//! - probe failure: surfaced on first occurrence, never retried here
//!
//! Probes for one run are strictly sequential. The only suspension points are the
//! probe call and the inter-probe sleep; both race against the cancellation token.

use crate::backoff::Backoff;
use crate::context::OperationContext;
use crate::error::WaitError;
use crate::probe::{RefreshProbe, StateSample};
use crate::spec::ConvergenceSpec;
use crate::status::Classification;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of one [`Poller::run`].
#[derive(Debug)]
pub enum Outcome<T> {
    /// A target status was observed.
    Converged(StateSample<T>),
    /// The deadline passed while the status was still pending.
    ///
    /// `last` is `None` only when the deadline passed during the very first probe.
    TimedOut {
        identity: String,
        last: Option<StateSample<T>>,
        elapsed: Duration,
    },
    /// Probe failure, unexpected state, or cancellation.
    Failed(WaitError),
}

impl<T> Outcome<T> {
    pub fn is_converged(&self) -> bool {
        matches!(self, Outcome::Converged(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Outcome::TimedOut { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Failed(WaitError::Cancelled { .. }))
    }

    /// Last status observed, whatever the outcome.
    pub fn last_status(&self) -> Option<&str> {
        match self {
            Outcome::Converged(s) => Some(s.status().as_str()),
            Outcome::TimedOut { last, .. } => last.as_ref().map(|s| s.status().as_str()),
            Outcome::Failed(e) => e.last_status(),
        }
    }

    /// Collapse into a `Result`, turning a timeout into [`WaitError::Timeout`].
    pub fn into_result(self) -> std::result::Result<StateSample<T>, WaitError> {
        match self {
            Outcome::Converged(s) => Ok(s),
            Outcome::TimedOut {
                identity,
                last,
                elapsed,
            } => Err(WaitError::Timeout {
                identity,
                last_status: last.map(|s| s.status().as_str().to_string()),
                elapsed,
            }),
            Outcome::Failed(e) => Err(e),
        }
    }
}

/// Backoff tuning shared by every run of a [`Poller`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Upper bound for the inter-probe sleep.
    pub max_poll_interval: Duration,
    /// Growth factor per pending observation. 1.0 polls at a fixed interval.
    pub backoff_factor: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_poll_interval: Duration::from_secs(10 * 60),
            backoff_factor: 2.0,
        }
    }
}

impl PollerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, overridden by env where set:
    /// - `STATEWAIT_MAX_POLL_INTERVAL_SECS`
    /// - `STATEWAIT_BACKOFF_FACTOR`
    pub fn from_env() -> Self {
        let d = Self::default();
        let max_poll_interval = std::env::var("STATEWAIT_MAX_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(d.max_poll_interval);
        let backoff_factor = std::env::var("STATEWAIT_BACKOFF_FACTOR")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|f| f.is_finite() && *f >= 1.0)
            .unwrap_or(d.backoff_factor);
        Self {
            max_poll_interval,
            backoff_factor,
        }
    }

    pub fn with_max_poll_interval(mut self, interval: Duration) -> Self {
        self.max_poll_interval = interval;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Poll at exactly the convergence spec's minimum interval.
    pub fn fixed_interval() -> Self {
        Self::default().with_backoff_factor(1.0)
    }
}

/// The convergence engine. Cheap to share; holds no per-run state.
#[derive(Debug, Clone, Default)]
pub struct Poller {
    config: PollerConfig,
}

impl Poller {
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(PollerConfig::from_env())
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Poll `probe` until `spec` converges, times out, or fails.
    pub async fn run<T, P>(
        &self,
        spec: &ConvergenceSpec,
        probe: &P,
        cancel: &CancellationToken,
    ) -> Outcome<T>
    where
        P: RefreshProbe<T> + ?Sized,
        T: Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let identity = spec.identity();
        let deadline = spec.deadline();
        let started = Instant::now();
        let mut backoff = Backoff::new(
            spec.min_poll_interval(),
            self.config.max_poll_interval,
            self.config.backoff_factor,
        );
        let mut last: Option<StateSample<T>> = None;
        let mut attempt: u32 = 0;
        let mut target_streak: u32 = 0;

        debug!(
            run_id = %run_id,
            identity = %identity,
            remaining_ms = spec.remaining().as_millis() as u64,
            "waiting for convergence ({})",
            spec.expected()
        );

        let initial_delay = spec.initial_delay().min(spec.remaining());
        if !initial_delay.is_zero() && sleep_or_cancel(initial_delay, cancel).await {
            return cancelled(run_id, identity, last);
        }

        loop {
            if cancel.is_cancelled() {
                return cancelled(run_id, identity, last);
            }
            if Instant::now() >= deadline {
                return timed_out(run_id, identity, last, started.elapsed());
            }

            attempt += 1;
            let refreshed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(run_id, identity, last),
                r = tokio::time::timeout_at(deadline, probe.refresh()) => r,
            };

            let sample = match refreshed {
                Err(_) => return timed_out(run_id, identity, last, started.elapsed()),
                Ok(Err(source)) => {
                    warn!(run_id = %run_id, identity = %identity, attempt, error = %source, "probe failed");
                    return Outcome::Failed(WaitError::Probe {
                        identity: identity.to_string(),
                        last_status: last.map(|s| s.status().as_str().to_string()),
                        source,
                    });
                }
                Ok(Ok(sample)) => sample,
            };

            debug!(run_id = %run_id, identity = %identity, attempt, status = %sample.status(), "probed state");

            match spec.classify(sample.status()) {
                Classification::Target => {
                    target_streak += 1;
                    if target_streak >= spec.continuous_target_occurrence() {
                        info!(
                            run_id = %run_id,
                            identity = %identity,
                            attempts = attempt,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            status = %sample.status(),
                            "converged"
                        );
                        return Outcome::Converged(sample);
                    }
                }
                Classification::Pending => target_streak = 0,
                Classification::Unexpected => {
                    warn!(run_id = %run_id, identity = %identity, status = %sample.status(), "unexpected state");
                    return Outcome::Failed(WaitError::UnexpectedState {
                        identity: identity.to_string(),
                        status: sample.status().as_str().to_string(),
                        expected: spec.expected(),
                    });
                }
            }
            last = Some(sample);

            let remaining = spec.remaining();
            if remaining.is_zero() {
                return timed_out(run_id, identity, last, started.elapsed());
            }
            let delay = backoff.next_delay(remaining);
            if sleep_or_cancel(delay, cancel).await {
                return cancelled(run_id, identity, last);
            }
        }
    }

    /// Run under `ctx`'s cancellation and fold the outcome into a `Result`.
    pub async fn wait<T, P>(
        &self,
        spec: &ConvergenceSpec,
        probe: &P,
        ctx: &OperationContext,
    ) -> Result<StateSample<T>>
    where
        P: RefreshProbe<T> + ?Sized,
        T: Send + 'static,
    {
        Ok(self
            .run(spec, probe, ctx.cancellation())
            .await
            .into_result()?)
    }
}

/// Returns true if cancelled before the sleep finished.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

fn cancelled<T>(run_id: Uuid, identity: &str, last: Option<StateSample<T>>) -> Outcome<T> {
    warn!(run_id = %run_id, identity = %identity, "wait cancelled");
    Outcome::Failed(WaitError::Cancelled {
        identity: identity.to_string(),
        last_status: last.map(|s| s.status().as_str().to_string()),
    })
}

fn timed_out<T>(
    run_id: Uuid,
    identity: &str,
    last: Option<StateSample<T>>,
    elapsed: Duration,
) -> Outcome<T> {
    warn!(
        run_id = %run_id,
        identity = %identity,
        elapsed_ms = elapsed.as_millis() as u64,
        last_status = last.as_ref().map(|s| s.status().as_str()).unwrap_or("<none>"),
        "deadline elapsed before convergence"
    );
    Outcome::TimedOut {
        identity: identity.to_string(),
        last,
        elapsed,
    }
}
