//! Deterministic control-plane fault injection.
//!
//! The point of a fault-injection step is deterministic timing: the
//! injector never retries a failed transition, because silently retrying a
//! failed deletion would corrupt the experiment's premise.

use crate::cluster::ClusterApi;
use crate::error::{HarnessError, HarnessResult};

/// Predicate selecting a fault-injection target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultSelector {
    /// Role label value the target must carry.
    pub role: String,
    /// Node the target must be scheduled on, when set.
    pub node: Option<String>,
}

impl FaultSelector {
    /// Selector matching `role` on any node.
    pub fn role(role: &str) -> Self {
        Self {
            role: role.to_string(),
            node: None,
        }
    }

    /// Selector matching `role` scheduled on `node`.
    pub fn role_on_node(role: &str, node: &str) -> Self {
        Self {
            role: role.to_string(),
            node: Some(node.to_string()),
        }
    }
}

/// A selected fault-injection target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultTarget {
    /// Workload to be removed.
    pub name: String,
    /// Node the target runs on, when scheduled.
    pub node: Option<String>,
}

/// Progress of a fault injection through its fixed transitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InjectionState {
    /// No target chosen yet.
    Idle,
    /// A target matched the predicate; deletion not yet requested.
    TargetSelected(FaultTarget),
    /// Deletion requested but never acknowledged by the collaborator.
    Deleted(FaultTarget),
    /// Deletion acknowledged; the fault has landed.
    Done(FaultTarget),
}

/// Removes one live control-plane workload mid-scenario.
///
/// Drives `Idle → TargetSelected → Deleted → Done`; any transition failure
/// is fatal to the scenario and leaves the machine where it stopped.
#[derive(Clone, Debug)]
pub struct ChaosInjector<C> {
    cluster: C,
    namespace: String,
    state: InjectionState,
}

impl<C: ClusterApi> ChaosInjector<C> {
    /// Injector over the control-plane namespace.
    pub fn new(cluster: C, namespace: &str) -> Self {
        Self {
            cluster,
            namespace: namespace.to_string(),
            state: InjectionState::Idle,
        }
    }

    /// Current transition state.
    pub fn state(&self) -> &InjectionState {
        &self.state
    }

    /// `Idle → TargetSelected`: enumerate live candidates and take the
    /// first match.
    ///
    /// Selection is first-match over the collaborator's deterministic
    /// ordering (not load-balanced, not randomized), so a rerun picks the
    /// same target. No match is fatal: the scenario cannot proceed without
    /// one.
    pub async fn select_target(&mut self, selector: &FaultSelector) -> HarnessResult<FaultTarget> {
        if self.state != InjectionState::Idle {
            return Err(HarnessError::InvalidState(format!(
                "fault target already selected ({:?})",
                self.state
            )));
        }
        let candidates = self
            .cluster
            .list_workloads(
                &self.namespace,
                Some(&selector.role),
                selector.node.as_deref(),
            )
            .await?;
        let chosen = candidates
            .into_iter()
            .next()
            .ok_or_else(|| HarnessError::FaultTargetNotFound {
                role: selector.role.clone(),
                node: selector.node.clone(),
            })?;
        let target = FaultTarget {
            name: chosen.name,
            node: chosen.node,
        };
        tracing::info!(
            "selected fault target {} on node {:?}",
            target.name,
            target.node
        );
        self.state = InjectionState::TargetSelected(target.clone());
        Ok(target)
    }

    /// `TargetSelected → Deleted → Done`: issue an immediate, non-graceful
    /// deletion and record the acknowledgement.
    ///
    /// A failed deletion leaves the machine in `Deleted`, request issued but
    /// never acknowledged, and is fatal, not retried.
    pub async fn inject(&mut self) -> HarnessResult<FaultTarget> {
        let target = match &self.state {
            InjectionState::TargetSelected(target) => target.clone(),
            other => {
                return Err(HarnessError::InvalidState(format!(
                    "no target selected for injection ({other:?})"
                )));
            }
        };
        self.state = InjectionState::Deleted(target.clone());
        self.cluster
            .delete_workload(&self.namespace, &target.name, false)
            .await?;
        self.state = InjectionState::Done(target.clone());
        tracing::info!("deleted fault target {}", target.name);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::FakeCluster;

    #[tokio::test]
    async fn first_match_selection_is_reproducible() {
        let cluster = FakeCluster::new();
        cluster.seed_running("sdn-system", "agent-b", "worker2", "node-agent");
        cluster.seed_running("sdn-system", "agent-a", "worker", "node-agent");

        for _ in 0..3 {
            let mut injector = ChaosInjector::new(cluster.clone(), "sdn-system");
            let target = injector
                .select_target(&FaultSelector::role("node-agent"))
                .await
                .expect("target");
            assert_eq!(target.name, "agent-a");
        }
    }

    #[tokio::test]
    async fn node_scoped_selection_honors_the_predicate() {
        let cluster = FakeCluster::new();
        cluster.seed_running("sdn-system", "agent-a", "worker", "node-agent");
        cluster.seed_running("sdn-system", "agent-b", "worker2", "node-agent");

        let mut injector = ChaosInjector::new(cluster.clone(), "sdn-system");
        let target = injector
            .select_target(&FaultSelector::role_on_node("node-agent", "worker2"))
            .await
            .expect("target");
        assert_eq!(target.name, "agent-b");

        injector.inject().await.expect("inject");
        assert!(matches!(injector.state(), InjectionState::Done(_)));
        assert_eq!(
            cluster.deletions(),
            vec![("sdn-system".to_string(), "agent-b".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn empty_candidate_set_is_fatal() {
        let cluster = FakeCluster::new();
        let mut injector = ChaosInjector::new(cluster, "sdn-system");
        let err = injector
            .select_target(&FaultSelector::role_on_node("node-agent", "worker"))
            .await
            .expect_err("must fail");
        match err {
            HarnessError::FaultTargetNotFound { role, node } => {
                assert_eq!(role, "node-agent");
                assert_eq!(node.as_deref(), Some("worker"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn transitions_only_run_in_order() {
        let cluster = FakeCluster::new();
        cluster.seed_running("sdn-system", "agent-a", "worker", "node-agent");
        let mut injector = ChaosInjector::new(cluster, "sdn-system");

        // Injecting without a target is an invalid transition.
        assert!(matches!(
            injector.inject().await,
            Err(HarnessError::InvalidState(_))
        ));

        injector
            .select_target(&FaultSelector::role("node-agent"))
            .await
            .expect("target");

        // Selecting twice is an invalid transition.
        assert!(matches!(
            injector.select_target(&FaultSelector::role("node-agent")).await,
            Err(HarnessError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn failed_deletion_stays_unacknowledged() {
        let cluster = FakeCluster::new();
        cluster.seed_running("sdn-system", "agent-a", "worker", "node-agent");
        let mut injector = ChaosInjector::new(cluster.clone(), "sdn-system");
        injector
            .select_target(&FaultSelector::role("node-agent"))
            .await
            .expect("target");

        // Delete the target out from under the injector so the request fails.
        cluster
            .delete_workload("sdn-system", "agent-a", true)
            .await
            .expect("external delete");

        assert!(injector.inject().await.is_err());
        assert!(matches!(injector.state(), InjectionState::Deleted(_)));
    }
}
