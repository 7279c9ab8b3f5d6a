//! 操作上下文：每个生命周期操作的截止时间与取消信号。
//!
//! Operation context: one timeout budget and one cancellation signal per lifecycle
//! operation.
//!
//! The context is passed explicitly into every wait. A convergence spec reads the
//! context's *remaining* time when it is built, so a slow initial mutating call
//! shortens the polling window instead of extending the operation.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Which lifecycle operation a context is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Read,
    Update,
    Delete,
}

/// Per-operation timeout budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(30 * 60),
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

impl Timeouts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, overridden by env where set:
    /// - `STATEWAIT_TIMEOUT_CREATE_SECS`
    /// - `STATEWAIT_TIMEOUT_READ_SECS`
    /// - `STATEWAIT_TIMEOUT_UPDATE_SECS`
    /// - `STATEWAIT_TIMEOUT_DELETE_SECS`
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            create: env_secs("STATEWAIT_TIMEOUT_CREATE_SECS").unwrap_or(d.create),
            read: env_secs("STATEWAIT_TIMEOUT_READ_SECS").unwrap_or(d.read),
            update: env_secs("STATEWAIT_TIMEOUT_UPDATE_SECS").unwrap_or(d.update),
            delete: env_secs("STATEWAIT_TIMEOUT_DELETE_SECS").unwrap_or(d.delete),
        }
    }

    pub fn with_create(mut self, d: Duration) -> Self {
        self.create = d;
        self
    }

    pub fn with_read(mut self, d: Duration) -> Self {
        self.read = d;
        self
    }

    pub fn with_update(mut self, d: Duration) -> Self {
        self.update = d;
        self
    }

    pub fn with_delete(mut self, d: Duration) -> Self {
        self.delete = d;
        self
    }

    pub fn for_kind(&self, kind: OperationKind) -> Duration {
        match kind {
            OperationKind::Create => self.create,
            OperationKind::Read => self.read,
            OperationKind::Update => self.update,
            OperationKind::Delete => self.delete,
        }
    }
}

/// Upper bound on an operation budget, roughly 30 years.
pub const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Deadline and cancellation for a single lifecycle operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl OperationContext {
    /// Context bounded by `timeout` from now. Cancelling `parent` cancels this context.
    ///
    /// A timeout too large to represent is clamped to [`FAR_FUTURE`] from now.
    pub fn with_timeout(parent: &CancellationToken, timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self {
            deadline: Some(deadline),
            cancel: parent.child_token(),
        }
    }

    /// Context bounded by an absolute deadline.
    pub fn with_deadline(parent: &CancellationToken, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: parent.child_token(),
        }
    }

    /// Context without a deadline. Waits refuse to start under it.
    pub fn unbounded(parent: &CancellationToken) -> Self {
        Self {
            deadline: None,
            cancel: parent.child_token(),
        }
    }

    pub fn for_operation(
        parent: &CancellationToken,
        timeouts: &Timeouts,
        kind: OperationKind,
    ) -> Self {
        Self::with_timeout(parent, timeouts.for_kind(kind))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left on the budget, saturating at zero. `None` without a deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(r) if r.is_zero())
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel this operation only.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
