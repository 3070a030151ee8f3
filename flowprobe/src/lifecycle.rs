//! Workload lifecycle waiting with diagnostic log capture.

use crate::cluster::{ClusterApi, LifecyclePhase};
use crate::config::RetryBudget;
use crate::error::HarnessError;
use crate::retry::poll_until;
use crate::time::TimeProvider;

/// Terminal or observable outcome of waiting on a workload's lifecycle.
///
/// Terminal values are final: once a workload has been observed in a
/// terminal phase, it is never reported as running again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The workload left `Pending` and is running.
    ScheduledRunning,
    /// The workload ran to completion successfully.
    Succeeded,
    /// The workload failed.
    Failed {
        /// Failure reason reported by the cluster.
        reason: String,
        /// Container logs, when the fetch succeeded.
        logs: Option<String>,
    },
    /// The retry budget elapsed before the awaited transition.
    TimedOut,
}

enum Snapshot {
    Running,
    Succeeded,
    Failed(String),
}

/// Waits for workload lifecycle transitions, attaching diagnostics on
/// failure.
#[derive(Clone, Debug)]
pub struct LifecycleWaiter<C, T> {
    cluster: C,
    time: T,
    budget: RetryBudget,
}

impl<C: ClusterApi, T: TimeProvider> LifecycleWaiter<C, T> {
    /// Waiter polling under `budget`.
    pub fn new(cluster: C, time: T, budget: RetryBudget) -> Self {
        Self {
            cluster,
            time,
            budget,
        }
    }

    /// Block until the workload leaves `Pending`, or the budget elapses.
    ///
    /// A workload observed already past `Running` reports its terminal
    /// outcome instead, never `ScheduledRunning` after the fact.
    pub async fn wait_until_scheduled(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
    ) -> LifecycleOutcome {
        let what = format!("workload {name} scheduling");
        let observed = poll_until(&self.budget, &self.time, &what, || {
            let cluster = self.cluster.clone();
            async move {
                let workload = cluster.get_workload(namespace, name).await?;
                Ok::<_, HarnessError>(match workload.phase {
                    LifecyclePhase::Pending => None,
                    LifecyclePhase::Running => Some(Snapshot::Running),
                    LifecyclePhase::Succeeded => Some(Snapshot::Succeeded),
                    LifecyclePhase::Failed(reason) => Some(Snapshot::Failed(reason)),
                })
            }
        })
        .await;
        self.outcome_from(namespace, name, container, observed, LifecycleOutcome::ScheduledRunning)
            .await
    }

    /// Block until the workload reaches a terminal phase, or the budget
    /// elapses.
    pub async fn wait_until_terminal(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
    ) -> LifecycleOutcome {
        let what = format!("workload {name} completion");
        let observed = poll_until(&self.budget, &self.time, &what, || {
            let cluster = self.cluster.clone();
            async move {
                let workload = cluster.get_workload(namespace, name).await?;
                Ok::<_, HarnessError>(match workload.phase {
                    LifecyclePhase::Pending | LifecyclePhase::Running => None,
                    LifecyclePhase::Succeeded => Some(Snapshot::Succeeded),
                    LifecyclePhase::Failed(reason) => Some(Snapshot::Failed(reason)),
                })
            }
        })
        .await;
        // Running snapshots never reach here; the poll closure filters them.
        self.outcome_from(namespace, name, container, observed, LifecycleOutcome::ScheduledRunning)
            .await
    }

    async fn outcome_from(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        observed: Option<Snapshot>,
        running: LifecycleOutcome,
    ) -> LifecycleOutcome {
        match observed {
            Some(Snapshot::Running) => running,
            Some(Snapshot::Succeeded) => LifecycleOutcome::Succeeded,
            Some(Snapshot::Failed(reason)) => {
                self.failed_with_logs(namespace, name, container, reason).await
            }
            None => LifecycleOutcome::TimedOut,
        }
    }

    /// Attach container logs to a failure. A log-fetch failure must not
    /// mask the original failure; it is reported as a warning only.
    async fn failed_with_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        reason: String,
    ) -> LifecycleOutcome {
        match self.cluster.workload_logs(namespace, name, container).await {
            Ok(logs) => {
                tracing::info!("workload {namespace}/{name} logs:\n{logs}");
                LifecycleOutcome::Failed {
                    reason,
                    logs: Some(logs),
                }
            }
            Err(err) => {
                tracing::warn!("failed to get logs from workload {name}: {err}");
                LifecycleOutcome::Failed { reason, logs: None }
            }
        }
    }
}
