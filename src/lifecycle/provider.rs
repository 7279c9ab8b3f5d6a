//! Resource provider unregistration.

use super::state::RegistrationState;
use super::within;
use crate::context::{OperationContext, OperationKind, Timeouts};
use crate::poller::Poller;
use crate::probe::{ProbeError, RefreshProbe, RefreshProbeExt, StateSample};
use crate::spec::ConvergenceSpec;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A resource provider as returned by the providers API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub namespace: Option<String>,
    pub registration_state: Option<String>,
}

impl Provider {
    pub fn with_state(state: impl Into<String>) -> Self {
        Self {
            namespace: None,
            registration_state: Some(state.into()),
        }
    }

    /// Absent state counts as registered: providers are registered by default.
    pub fn is_registered(&self) -> bool {
        match self.registration_state.as_deref() {
            Some(s) => matches!(s.parse::<RegistrationState>(), Ok(RegistrationState::Registered)),
            None => true,
        }
    }
}

/// Providers API. Implementations must be safe for concurrent use.
#[async_trait]
pub trait ProvidersClient: Send + Sync {
    async fn get(&self, namespace: &str) -> std::result::Result<Provider, ProbeError>;
    async fn unregister(&self, namespace: &str) -> std::result::Result<Provider, ProbeError>;
}

/// Collapses every state other than `Unregistered` into `Processing`.
struct ProviderStateProbe<'a, C> {
    client: &'a C,
    namespace: &'a str,
}

#[async_trait]
impl<'a, C: ProvidersClient> RefreshProbe<Provider> for ProviderStateProbe<'a, C> {
    async fn refresh(&self) -> std::result::Result<StateSample<Provider>, ProbeError> {
        let provider = self.client.get(self.namespace).await?;
        let status = match provider
            .registration_state
            .as_deref()
            .map(str::parse::<RegistrationState>)
        {
            Some(Ok(RegistrationState::Unregistered)) => RegistrationState::Unregistered,
            _ => RegistrationState::Processing,
        };
        Ok(StateSample::new(provider, status))
    }
}

/// Lifecycle helpers for resource providers.
pub struct ProviderLifecycle<C> {
    client: Arc<C>,
    poller: Poller,
    timeouts: Timeouts,
    min_poll_interval: Duration,
}

impl<C: ProvidersClient> ProviderLifecycle<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            poller: Poller::default(),
            timeouts: Timeouts::default(),
            min_poll_interval: Duration::from_secs(15),
        }
    }

    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    /// Unregister `namespace` if it is registered and wait for `Unregistered`.
    ///
    /// Returns `true` if an unregistration was issued.
    pub async fn ensure_unregistered(
        &self,
        parent: &CancellationToken,
        namespace: &str,
    ) -> Result<bool> {
        let ctx = OperationContext::for_operation(parent, &self.timeouts, OperationKind::Delete);
        let identity = format!("resource provider {}", namespace);

        let current = within(&ctx, "retrieving", &identity, self.client.get(namespace)).await?;
        if !current.is_registered() {
            debug!(provider = %namespace, "already unregistered");
            return Ok(false);
        }

        within(&ctx, "unregistering", &identity, self.client.unregister(namespace)).await?;

        let spec = ConvergenceSpec::builder(identity)
            .pending([RegistrationState::Processing, RegistrationState::Registered])
            .target([RegistrationState::Unregistered])
            .min_poll_interval(self.min_poll_interval)
            .deadline_from(&ctx)
            .build()?;
        let probe = ProviderStateProbe {
            client: self.client.as_ref(),
            namespace,
        }
        .not_found_as(RegistrationState::Unregistered);
        self.poller.wait(&spec, &probe, &ctx).await?;
        info!(provider = %namespace, "resource provider unregistered");
        Ok(true)
    }
}
