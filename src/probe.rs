//! 探针边界：单次远程状态读取及其失败分类。
//!
//! Probe boundary.
//!
//! A [`RefreshProbe`] performs exactly one remote read for one watched identity and
//! yields a [`StateSample`]. Probes hold no mutable caller state and are safe to call
//! repeatedly; the poller never calls the same probe concurrently with itself.
//!
//! Whether "not found" is an interim state or a failure depends on the caller, so it
//! is expressed here, at the probe mapping, via [`NotFoundAs`].

use crate::status::Status;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use thiserror::Error;

/// One observation of the remote system.
#[derive(Debug, Clone, Serialize)]
pub struct StateSample<T> {
    value: T,
    status: Status,
}

impl<T> StateSample<T> {
    pub fn new(value: T, status: impl Into<Status>) -> Self {
        Self {
            value,
            status: status.into(),
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn into_parts(self) -> (T, Status) {
        (self.value, self.status)
    }
}

/// Coarse category of a failed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeErrorKind {
    /// The watched object does not exist (remote 404).
    NotFound,
    /// Network-level failure; no response was received.
    Transport,
    /// Credentials were rejected.
    Unauthorized,
    /// The remote answered with an error status.
    Remote { status: u16 },
    /// The remote object was returned without a status field.
    MissingState,
}

impl fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeErrorKind::NotFound => f.write_str("not_found"),
            ProbeErrorKind::Transport => f.write_str("transport"),
            ProbeErrorKind::Unauthorized => f.write_str("unauthorized"),
            ProbeErrorKind::Remote { status } => write!(f, "remote HTTP {}", status),
            ProbeErrorKind::MissingState => f.write_str("missing_state"),
        }
    }
}

/// A failed remote read.
#[derive(Debug, Error)]
#[error("{message} ({kind})")]
pub struct ProbeError {
    kind: ProbeErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ProbeError {
    pub fn new(kind: ProbeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::NotFound, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Transport, message)
    }

    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Remote { status }, message)
    }

    pub fn missing_state(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::MissingState, message)
    }

    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ProbeErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ProbeErrorKind::NotFound
    }
}

/// A single remote read bound to one identity.
#[async_trait]
pub trait RefreshProbe<T>: Send + Sync {
    async fn refresh(&self) -> Result<StateSample<T>, ProbeError>;
}

/// Probe backed by a closure returning a future.
///
/// ```rust
/// use statewait::probe::{probe_fn, ProbeError, StateSample};
///
/// let probe = probe_fn(|| async { Ok::<_, ProbeError>(StateSample::new((), "Registered")) });
/// # let _ = probe;
/// ```
pub struct FnProbe<F> {
    f: F,
}

pub fn probe_fn<F>(f: F) -> FnProbe<F> {
    FnProbe { f }
}

#[async_trait]
impl<T, F, Fut> RefreshProbe<T> for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateSample<T>, ProbeError>> + Send,
    T: Send + 'static,
{
    async fn refresh(&self) -> Result<StateSample<T>, ProbeError> {
        (self.f)().await
    }
}

/// Maps a `NotFound` probe failure to a sample carrying a fixed status.
///
/// Used while watching a delete: the object disappearing is progress (or success),
/// not a transport failure.
pub struct NotFoundAs<P> {
    inner: P,
    status: Status,
}

impl<P> NotFoundAs<P> {
    pub fn new(inner: P, status: impl Into<Status>) -> Self {
        Self {
            inner,
            status: status.into(),
        }
    }
}

#[async_trait]
impl<T, P> RefreshProbe<T> for NotFoundAs<P>
where
    P: RefreshProbe<T>,
    T: Default + Send + 'static,
{
    async fn refresh(&self) -> Result<StateSample<T>, ProbeError> {
        match self.inner.refresh().await {
            Err(e) if e.is_not_found() => {
                tracing::debug!(status = %self.status, "probe target not found, mapping to status");
                Ok(StateSample::new(T::default(), self.status.clone()))
            }
            other => other,
        }
    }
}

/// Combinators on probes.
pub trait RefreshProbeExt<T>: RefreshProbe<T> + Sized {
    fn not_found_as(self, status: impl Into<Status>) -> NotFoundAs<Self> {
        NotFoundAs::new(self, status)
    }
}

impl<T, P: RefreshProbe<T>> RefreshProbeExt<T> for P {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_probe_calls_closure_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let probe = probe_fn(move || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                Ok(StateSample::new(n, "Registering"))
            }
        });

        assert_eq!(*probe.refresh().await.unwrap().value(), 0);
        assert_eq!(*probe.refresh().await.unwrap().value(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_found_as_maps_only_not_found() {
        let missing = probe_fn(|| async {
            Err::<StateSample<Option<u8>>, _>(ProbeError::not_found("feature gone"))
        })
        .not_found_as("Unregistered");
        let sample = missing.refresh().await.unwrap();
        assert_eq!(sample.status().as_str(), "Unregistered");
        assert!(sample.value().is_none());

        let broken = probe_fn(|| async {
            Err::<StateSample<Option<u8>>, _>(ProbeError::remote(503, "service unavailable"))
        })
        .not_found_as("Unregistered");
        let err = broken.refresh().await.unwrap_err();
        assert_eq!(err.kind(), ProbeErrorKind::Remote { status: 503 });
    }

    #[test]
    fn test_probe_error_display_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = ProbeError::transport("GET feature failed").with_source(io);
        assert_eq!(err.to_string(), "GET feature failed (transport)");
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(
            ProbeError::remote(500, "boom").to_string(),
            "boom (remote HTTP 500)"
        );
    }
}
