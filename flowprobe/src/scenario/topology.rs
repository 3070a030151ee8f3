//! Topology mode discovery.

use std::fmt;

use crate::cluster::ClusterApi;
use crate::config::ScenarioConfig;
use crate::error::{HarnessError, HarnessResult};

/// Deployment flavor of the cluster under test.
///
/// Discovered once per scenario and threaded through subsequent calls as
/// an immutable value; nothing mutates it after discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopologyMode {
    /// Dedicated worker nodes alongside a single control-plane node.
    SingleControlPlane,
    /// Control-plane nodes double as workers.
    HighlyAvailable,
}

impl fmt::Display for TopologyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyMode::SingleControlPlane => write!(f, "single-control-plane"),
            TopologyMode::HighlyAvailable => write!(f, "highly-available"),
        }
    }
}

/// Discover the topology mode by probing for the SDN agent on the primary
/// node set, falling back to the alternate set.
///
/// Finding the agent on neither set is fatal: the environment does not
/// match any known deployment and no scenario can place workloads sanely.
pub async fn discover<C: ClusterApi>(
    cluster: &C,
    config: &ScenarioConfig,
) -> HarnessResult<TopologyMode> {
    let role = &config.node_agent_role;
    let primary = &config.worker_nodes.source;
    let agents = cluster
        .list_workloads(&config.control_plane_namespace, Some(role), Some(primary))
        .await?;
    if !agents.is_empty() {
        return Ok(TopologyMode::SingleControlPlane);
    }

    let fallback = &config.ha_nodes.source;
    tracing::info!("no {role} workload on {primary}, probing {fallback}");
    let agents = cluster
        .list_workloads(&config.control_plane_namespace, Some(role), Some(fallback))
        .await?;
    if !agents.is_empty() {
        tracing::info!("detected a highly available environment");
        return Ok(TopologyMode::HighlyAvailable);
    }

    Err(HarnessError::TopologyNotDiscovered { role: role.clone() })
}
