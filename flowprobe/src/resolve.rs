//! Address resolution under eventual consistency.

use std::net::IpAddr;
use std::str::FromStr;

use crate::cluster::ClusterApi;
use crate::config::RetryBudget;
use crate::error::{HarnessError, HarnessResult};
use crate::retry::poll_until;
use crate::time::TimeProvider;

/// Polls a created workload for a valid network address.
///
/// Status propagation in the cluster is eventually consistent: a workload
/// can report ready before its address is queryable, so the first response
/// is never trusted. Candidate strings are validated as well-formed
/// addresses and retried until one parses or the budget runs out.
#[derive(Clone, Debug)]
pub struct AddressResolver<C, T> {
    cluster: C,
    time: T,
    budget: RetryBudget,
}

impl<C: ClusterApi, T: TimeProvider> AddressResolver<C, T> {
    /// Resolver polling under `budget`.
    pub fn new(cluster: C, time: T, budget: RetryBudget) -> Self {
        Self {
            cluster,
            time,
            budget,
        }
    }

    /// Return the first well-formed address observed for `name`.
    ///
    /// Transient query failures are logged and retried; only exhausting
    /// the budget is terminal, yielding `AddressResolutionTimeout`.
    pub async fn resolve(&self, namespace: &str, name: &str) -> HarnessResult<IpAddr> {
        let what = format!("address of workload {name}");
        let found = poll_until(&self.budget, &self.time, &what, || {
            let cluster = self.cluster.clone();
            async move {
                let workload = cluster.get_workload(namespace, name).await?;
                Ok::<_, HarnessError>(workload.address.and_then(|raw| {
                    match IpAddr::from_str(raw.trim()) {
                        Ok(address) => Some(address),
                        Err(_) => {
                            tracing::debug!("workload {name} reported unparseable address {raw:?}");
                            None
                        }
                    }
                }))
            }
        })
        .await;
        found.ok_or_else(|| HarnessError::AddressResolutionTimeout {
            name: name.to_string(),
            attempts: self.budget.max_attempts,
        })
    }
}
