//! Subscription feature registration.

use super::state::RegistrationState;
use super::within;
use crate::context::{OperationContext, OperationKind, Timeouts};
use crate::poller::Poller;
use crate::probe::{ProbeError, RefreshProbe, StateSample};
use crate::spec::ConvergenceSpec;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Identity of one feature under one subscription. Display only; never parsed here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureId {
    pub subscription_id: String,
    pub provider_namespace: String,
    pub name: String,
}

impl FeatureId {
    pub fn new(
        subscription_id: impl Into<String>,
        provider_namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            provider_namespace: provider_namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/providers/Microsoft.Features/providers/{}/features/{}",
            self.subscription_id, self.provider_namespace, self.name
        )
    }
}

/// A feature as returned by the features API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub name: Option<String>,
    pub state: Option<String>,
}

impl Feature {
    pub fn with_state(state: impl Into<String>) -> Self {
        Self {
            name: None,
            state: Some(state.into()),
        }
    }

    fn parsed_state(&self) -> Option<Result<RegistrationState>> {
        self.state.as_deref().map(str::parse)
    }
}

/// Features API. Implementations must be safe for concurrent use.
#[async_trait]
pub trait FeaturesClient: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> std::result::Result<Feature, ProbeError>;
    async fn register(&self, namespace: &str, name: &str)
        -> std::result::Result<Feature, ProbeError>;
    async fn unregister(
        &self,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<Feature, ProbeError>;
}

/// Reads one feature's registration state.
struct FeatureStateProbe<'a, C> {
    client: &'a C,
    id: &'a FeatureId,
}

#[async_trait]
impl<'a, C: FeaturesClient> RefreshProbe<Feature> for FeatureStateProbe<'a, C> {
    async fn refresh(&self) -> std::result::Result<StateSample<Feature>, ProbeError> {
        let feature = self
            .client
            .get(&self.id.provider_namespace, &self.id.name)
            .await?;
        match feature.state.clone() {
            Some(state) => Ok(StateSample::new(feature, state)),
            None => Err(ProbeError::missing_state(format!(
                "reading registration state of feature {}",
                self.id
            ))),
        }
    }
}

/// Create / read / delete for subscription features.
pub struct FeatureLifecycle<C> {
    client: Arc<C>,
    poller: Poller,
    timeouts: Timeouts,
    min_poll_interval: Duration,
}

impl<C: FeaturesClient> FeatureLifecycle<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            poller: Poller::default(),
            timeouts: Timeouts::default(),
            min_poll_interval: Duration::from_secs(3 * 60),
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

    fn probe<'a>(&'a self, id: &'a FeatureId) -> FeatureStateProbe<'a, C> {
        FeatureStateProbe {
            client: self.client.as_ref(),
            id,
        }
    }

    /// Register a feature and wait until it reports `Registered`.
    pub async fn create(&self, parent: &CancellationToken, id: &FeatureId) -> Result<Feature> {
        let ctx = OperationContext::for_operation(parent, &self.timeouts, OperationKind::Create);
        let resource_id = id.to_string();

        let existing = within(
            &ctx,
            "checking for existing feature",
            &resource_id,
            self.client.get(&id.provider_namespace, &id.name),
        )
        .await?;
        match existing.parsed_state() {
            Some(Ok(RegistrationState::Pending)) => {
                return Err(Error::ManualApprovalRequired { id: resource_id });
            }
            Some(Ok(RegistrationState::NotRegistered | RegistrationState::Unregistered)) | None => {}
            Some(_) => return Err(Error::AlreadyExists { id: resource_id }),
        }

        let registered = within(
            &ctx,
            "registering feature",
            &resource_id,
            self.client.register(&id.provider_namespace, &id.name),
        )
        .await?;
        if let Some(Ok(RegistrationState::Pending)) = registered.parsed_state() {
            return Err(Error::ManualApprovalRequired { id: resource_id });
        }

        let spec = ConvergenceSpec::builder(format!("feature {}", resource_id))
            .pending([RegistrationState::Registering])
            .target([RegistrationState::Registered])
            .min_poll_interval(self.min_poll_interval)
            .deadline_from(&ctx)
            .build()?;
        self.poller.wait(&spec, &self.probe(id), &ctx).await?;
        info!(feature = %resource_id, "feature registered");

        self.read(parent, id).await
    }

    /// Fetch a feature, failing unless it is registered.
    pub async fn read(&self, parent: &CancellationToken, id: &FeatureId) -> Result<Feature> {
        let ctx = OperationContext::for_operation(parent, &self.timeouts, OperationKind::Read);
        let resource_id = id.to_string();

        let feature = within(
            &ctx,
            "retrieving feature",
            &resource_id,
            self.client.get(&id.provider_namespace, &id.name),
        )
        .await?;
        match feature.parsed_state() {
            Some(Ok(RegistrationState::Pending)) => {
                Err(Error::ManualApprovalRequired { id: resource_id })
            }
            Some(Ok(RegistrationState::Registered)) | None => Ok(feature),
            Some(_) => Err(Error::NotRegistered {
                id: resource_id,
                state: feature.state.unwrap_or_default(),
            }),
        }
    }

    /// Unregister a feature and wait until it reports `NotRegistered` or `Unregistered`.
    pub async fn delete(&self, parent: &CancellationToken, id: &FeatureId) -> Result<()> {
        let ctx = OperationContext::for_operation(parent, &self.timeouts, OperationKind::Delete);
        let resource_id = id.to_string();

        let resp = within(
            &ctx,
            "unregistering feature",
            &resource_id,
            self.client.unregister(&id.provider_namespace, &id.name),
        )
        .await?;
        if let Some(Ok(RegistrationState::Pending)) = resp.parsed_state() {
            return Err(Error::ManualApprovalRequired { id: resource_id });
        }

        let spec = ConvergenceSpec::builder(format!("feature {}", resource_id))
            .pending([RegistrationState::Unregistering])
            .target([
                RegistrationState::NotRegistered,
                RegistrationState::Unregistered,
            ])
            .min_poll_interval(self.min_poll_interval)
            .deadline_from(&ctx)
            .build()?;
        self.poller.wait(&spec, &self.probe(id), &ctx).await?;
        info!(feature = %resource_id, "feature unregistered");
        Ok(())
    }
}
