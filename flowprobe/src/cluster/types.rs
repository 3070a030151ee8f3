//! Observed cluster object types shared across the harness.

use std::collections::BTreeMap;
use std::net::IpAddr;

/// Label key carrying a workload's role.
pub const ROLE_LABEL: &str = "role";

/// Annotation key consumers read to find the external gateway address.
pub const EXTERNAL_GATEWAY_ANNOTATION: &str = "hybrid-overlay/external-gateway";

/// Annotation key for the VTEP the overlay encapsulates toward.
pub const VTEP_ANNOTATION: &str = "hybrid-overlay/vtep";

/// Node annotation holding the per-node workload subnets as JSON.
pub const NODE_SUBNETS_ANNOTATION: &str = "hybrid-overlay/node-subnets";

/// Container name derived from a workload name.
pub fn container_name(workload: &str) -> String {
    format!("{workload}-container")
}

/// Desired workload handed to the cluster for creation.
///
/// Workloads are scenario-scoped: the restart policy is always "never" and
/// the namespace teardown removes them implicitly.
#[derive(Clone, Debug)]
pub struct WorkloadSpec {
    /// Workload name, unique within the scenario.
    pub name: String,
    /// Command executed inside the workload's single container.
    pub command: Vec<String>,
    /// Node the workload is pinned to; `None` lets the scheduler choose.
    pub node: Option<String>,
    /// Labels attached to the workload.
    pub labels: BTreeMap<String, String>,
}

impl WorkloadSpec {
    /// Shell-wrapped workload running `script`, pinned to `node` when given.
    pub fn shell(name: &str, node: Option<&str>, script: &str) -> Self {
        Self {
            name: name.to_string(),
            command: vec!["bash".to_string(), "-c".to_string(), script.to_string()],
            node: node.map(str::to_string),
            labels: BTreeMap::new(),
        }
    }

    /// Name of the workload's single container.
    pub fn container_name(&self) -> String {
        container_name(&self.name)
    }
}

/// Observable lifecycle phase reported by the cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Created but not yet scheduled onto a node.
    Pending,
    /// Scheduled and running.
    Running,
    /// Exited successfully.
    Succeeded,
    /// Exited with a failure carrying the reported reason.
    Failed(String),
}

impl LifecyclePhase {
    /// Whether the phase is final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecyclePhase::Succeeded | LifecyclePhase::Failed(_))
    }
}

/// A workload object as observed through the cluster API.
#[derive(Clone, Debug)]
pub struct Workload {
    /// Workload name.
    pub name: String,
    /// Node the workload landed on, once scheduled.
    pub node: Option<String>,
    /// Current lifecycle phase.
    pub phase: LifecyclePhase,
    /// Raw address string as reported. Status propagation is eventually
    /// consistent, so this is validated by the resolver, never trusted.
    pub address: Option<String>,
    /// Labels attached at creation.
    pub labels: BTreeMap<String, String>,
}

/// The two-key namespace annotation redirecting consumers to a gateway.
///
/// Overwriting this mapping is the hot-swap mechanism: consumers pick up
/// the new (gateway, VTEP) pair without being recreated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayAnnotation {
    /// External gateway address consumers route toward.
    pub external_gateway: IpAddr,
    /// VTEP terminating the encapsulated path.
    pub vtep: IpAddr,
}

impl GatewayAnnotation {
    /// Render as annotation key/value pairs.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        vec![
            (
                EXTERNAL_GATEWAY_ANNOTATION.to_string(),
                self.external_gateway.to_string(),
            ),
            (VTEP_ANNOTATION.to_string(), self.vtep.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_spec_pins_node_and_wraps_the_script() {
        let spec = WorkloadSpec::shell("dst-reach-target", Some("worker2"), "sleep 20000");
        assert_eq!(spec.node.as_deref(), Some("worker2"));
        assert_eq!(spec.command, vec!["bash", "-c", "sleep 20000"]);
        assert_eq!(spec.container_name(), "dst-reach-target-container");
    }

    #[test]
    fn terminal_phases() {
        assert!(!LifecyclePhase::Pending.is_terminal());
        assert!(!LifecyclePhase::Running.is_terminal());
        assert!(LifecyclePhase::Succeeded.is_terminal());
        assert!(LifecyclePhase::Failed("oom".to_string()).is_terminal());
    }

    #[test]
    fn gateway_annotation_renders_both_keys() {
        let annotation = GatewayAnnotation {
            external_gateway: "10.249.0.1".parse().expect("addr"),
            vtep: "172.18.0.3".parse().expect("addr"),
        };
        let pairs = annotation.to_pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, EXTERNAL_GATEWAY_ANNOTATION);
        assert_eq!(pairs[0].1, "10.249.0.1");
        assert_eq!(pairs[1].0, VTEP_ANNOTATION);
        assert_eq!(pairs[1].1, "172.18.0.3");
    }
}
