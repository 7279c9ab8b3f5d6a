use crate::probe::ProbeError;
use std::time::Duration;
use thiserror::Error;

/// Structured error context for configuration and validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field that caused the error (e.g., "spec.pending", "context.deadline")
    pub field_path: Option<String>,
    /// Additional detail (e.g., the offending value)
    pub details: Option<String>,
    /// Component that raised the error (e.g., "convergence_spec", "feature_lifecycle")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

fn last_seen(status: &Option<String>) -> &str {
    status.as_deref().unwrap_or("<none>")
}

/// Why a wait did not converge.
///
/// Every variant names the watched identity and the last status observed, so an
/// operator can tell how far convergence got.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("retrieving state of {identity} (last state: {}): {source}", last_seen(.last_status))]
    Probe {
        identity: String,
        last_status: Option<String>,
        #[source]
        source: ProbeError,
    },

    #[error("{identity} reached unexpected state {status:?} (expected one of: {expected})")]
    UnexpectedState {
        identity: String,
        status: String,
        expected: String,
    },

    #[error("timed out after {elapsed:?} waiting for {identity} to converge (last state: {})", last_seen(.last_status))]
    Timeout {
        identity: String,
        last_status: Option<String>,
        elapsed: Duration,
    },

    #[error("waiting for {identity} was cancelled (last state: {})", last_seen(.last_status))]
    Cancelled {
        identity: String,
        last_status: Option<String>,
    },
}

impl WaitError {
    /// Stable class name for logs and metrics.
    pub fn class(&self) -> &'static str {
        match self {
            WaitError::Probe { .. } => "probe_failed",
            WaitError::UnexpectedState { .. } => "unexpected_state",
            WaitError::Timeout { .. } => "timeout",
            WaitError::Cancelled { .. } => "cancelled",
        }
    }

    /// Only a timeout suggests re-running the whole operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }

    pub fn identity(&self) -> &str {
        match self {
            WaitError::Probe { identity, .. }
            | WaitError::UnexpectedState { identity, .. }
            | WaitError::Timeout { identity, .. }
            | WaitError::Cancelled { identity, .. } => identity,
        }
    }

    pub fn last_status(&self) -> Option<&str> {
        match self {
            WaitError::UnexpectedState { status, .. } => Some(status),
            WaitError::Probe { last_status, .. }
            | WaitError::Timeout { last_status, .. }
            | WaitError::Cancelled { last_status, .. } => last_status.as_deref(),
        }
    }
}

/// Unified error type for statewait.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Wait error: {0}")]
    Wait(#[from] WaitError),

    #[error("{action} {id}: {source}")]
    Remote {
        action: String,
        id: String,
        #[source]
        source: ProbeError,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("{id} requires manual approval and cannot be managed automatically")]
    ManualApprovalRequired { id: String },

    #[error("{id} already exists and must be imported before it can be managed")]
    AlreadyExists { id: String },

    #[error("{id} is not registered (state: {state})")]
    NotRegistered { id: String, state: String },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Validation { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    /// A remote client call for `id` failed.
    pub fn remote(action: impl Into<String>, id: impl ToString, source: ProbeError) -> Self {
        Error::Remote {
            action: action.into(),
            id: id.to_string(),
            source,
        }
    }

    /// The wait failure underneath, if this error came out of a poll.
    pub fn as_wait(&self) -> Option<&WaitError> {
        match self {
            Error::Wait(w) => Some(w),
            _ => None,
        }
    }
}
