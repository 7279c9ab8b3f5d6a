//! 生命周期调用方：特性注册/注销与资源提供程序注销的参考实现。
//!
//! Lifecycle callers.
//!
//! Reference callers of the poller for the two resources that need it: subscription
//! features (register / unregister) and resource providers (unregister). Each
//! operation issues its mutating call, builds a [`ConvergenceSpec`] whose deadline is
//! whatever remains of the operation's budget, and waits.
//!
//! The remote API clients are traits; transport and auth live with the implementor.
//!
//! [`ConvergenceSpec`]: crate::ConvergenceSpec

pub mod feature;
pub mod provider;
pub mod state;

pub use feature::{Feature, FeatureId, FeatureLifecycle, FeaturesClient};
pub use provider::{Provider, ProviderLifecycle, ProvidersClient};
pub use state::RegistrationState;

use crate::context::OperationContext;
use crate::error::WaitError;
use crate::probe::ProbeError;
use crate::{Error, Result};
use std::future::Future;

/// Run one client call under `ctx`'s cancellation and deadline.
pub(crate) async fn within<T, F>(ctx: &OperationContext, action: &str, id: &str, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, ProbeError>>,
{
    let started = tokio::time::Instant::now();
    let bounded = async {
        match ctx.deadline() {
            Some(deadline) => tokio::time::timeout_at(deadline, call).await.ok(),
            None => Some(call.await),
        }
    };
    let res = tokio::select! {
        biased;
        _ = ctx.cancellation().cancelled() => {
            return Err(WaitError::Cancelled {
                identity: id.to_string(),
                last_status: None,
            }
            .into());
        }
        r = bounded => r,
    };
    match res {
        Some(Ok(v)) => Ok(v),
        Some(Err(e)) => Err(Error::remote(action, id, e)),
        None => Err(WaitError::Timeout {
            identity: id.to_string(),
            last_status: None,
            elapsed: started.elapsed(),
        }
        .into()),
    }
}
