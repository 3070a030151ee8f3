//! Configuration structures for scenario behavior.

use std::time::Duration;

use crate::scenario::TopologyMode;

/// Retry policy for eventually consistent collaborator queries.
///
/// Exhausting the budget is a terminal failure surfaced by the caller,
/// never a silent default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBudget {
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
    /// Fixed delay between consecutive attempts.
    pub interval: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_secs(3),
        }
    }
}

impl RetryBudget {
    /// Create a budget with explicit parameters.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// A tight budget for harness self-tests.
    pub fn fast() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_millis(5),
        }
    }

    /// The total time the budget can spend sleeping between attempts.
    pub fn total_interval(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Configuration for a connectivity probe workload.
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    /// Reachability attempts the probe workload performs for TCP targets.
    pub attempts: u32,
    /// Per-attempt timeout handed to the in-workload command.
    pub attempt_timeout: Duration,
    /// Delay between consecutive attempts inside the workload.
    pub attempt_delay: Duration,
    /// Echo requests sent for ICMP-style targets.
    pub icmp_count: u32,
    /// Warmup sleep before the first echo request, letting routes settle.
    pub icmp_warmup: Duration,
    /// Budget for waiting on the probe workload's own lifecycle.
    pub lifecycle_budget: RetryBudget,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            attempt_timeout: Duration::from_secs(30),
            attempt_delay: Duration::from_secs(2),
            icmp_count: 3,
            icmp_warmup: Duration::from_secs(20),
            lifecycle_budget: RetryBudget::default(),
        }
    }
}

impl ProbeConfig {
    /// A probe configuration with millisecond pacing for harness self-tests.
    pub fn fast() -> Self {
        Self {
            attempts: 3,
            attempt_timeout: Duration::from_millis(50),
            attempt_delay: Duration::from_millis(5),
            icmp_count: 2,
            icmp_warmup: Duration::ZERO,
            lifecycle_budget: RetryBudget::fast(),
        }
    }

    /// Budget for polling the probe workload to its terminal phase.
    ///
    /// Each poll sleeps one full attempt slot, with three slots of slack
    /// per attempt so a slow workload never outlives the poller.
    pub fn terminal_budget(&self) -> RetryBudget {
        RetryBudget {
            max_attempts: self.attempts.max(1) * 3,
            interval: self.attempt_timeout + self.attempt_delay,
        }
    }

    /// Hard deadline for receiving the probe's terminal verdict.
    ///
    /// Covers the scheduling wait and the full terminal polling budget
    /// with one attempt slot of slack; a probe silent past this point is
    /// abandoned, not awaited.
    pub fn verdict_deadline(&self) -> Duration {
        self.lifecycle_budget.total_interval()
            + self.terminal_budget().total_interval()
            + self.icmp_warmup
            + self.attempt_timeout
            + self.attempt_delay
    }
}

/// Tunnel parameters for the simulated external gateway.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Virtual network identifier the tunnel interface is bound to.
    pub tunnel_id: u32,
    /// UDP encapsulation port, the IANA-assigned VXLAN port.
    pub encapsulation_port: u16,
    /// Name of the tunnel interface created on the gateway host.
    pub tunnel_ifname: String,
    /// Physical device the tunnel binds to inside the host.
    pub parent_device: String,
    /// Settle time after route installation before the endpoint is used.
    pub stabilization_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            tunnel_id: 4097,
            encapsulation_port: 4789,
            tunnel_ifname: "vxlan0".to_string(),
            parent_device: "eth0".to_string(),
            stabilization_delay: Duration::from_secs(10),
        }
    }
}

impl GatewayConfig {
    /// Gateway configuration with no settle delay for harness self-tests.
    pub fn fast() -> Self {
        Self {
            stabilization_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Source/destination node names for one topology mode.
#[derive(Clone, Debug)]
pub struct NodePair {
    /// Node workloads generating traffic are pinned to.
    pub source: String,
    /// Node destination workloads are pinned to.
    pub destination: String,
}

impl NodePair {
    /// Pair from borrowed names.
    pub fn new(source: &str, destination: &str) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
        }
    }
}

/// Per-scenario configuration constants.
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    /// Namespace owned by the scenario; every workload lives here.
    pub namespace: String,
    /// Namespace the SDN control-plane components run in.
    pub control_plane_namespace: String,
    /// Role label carried by the per-node SDN agent.
    pub node_agent_role: String,
    /// Role label carried by the central SDN controller.
    pub controller_role: String,
    /// Node names used in single-control-plane mode.
    pub worker_nodes: NodePair,
    /// Node names used when the cluster runs highly available.
    pub ha_nodes: NodePair,
    /// External (host, port) target for steady-state probes.
    pub external_target: (String, u16),
    /// URL fetched by the egress preflight check.
    pub preflight_url: String,
    /// Hard timeout for the preflight HTTP request.
    pub preflight_timeout: Duration,
    /// Pause between the probe becoming observable and the fault landing,
    /// so traffic is demonstrably flowing when the component dies.
    pub fault_delay: Duration,
    /// Settle time after (re)annotating the namespace before traffic is
    /// asserted on.
    pub annotation_settle_delay: Duration,
    /// Gateway address (CIDR form) for the single-gateway scenario.
    pub gateway_cidr: String,
    /// Gateway addresses (CIDR form) for the hot-swap scenario.
    pub hot_swap_gateway_cidrs: (String, String),
    /// Overlay bridge whose flow table must stay cold on unused paths.
    pub overlay_bridge: String,
    /// Budget for status and address polling loops.
    pub retry: RetryBudget,
    /// Probe workload behavior.
    pub probe: ProbeConfig,
    /// Tunnel parameters for simulated gateways.
    pub gateway: GatewayConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            namespace: "flowprobe".to_string(),
            control_plane_namespace: "sdn-system".to_string(),
            node_agent_role: "node-agent".to_string(),
            controller_role: "controller".to_string(),
            worker_nodes: NodePair::new("worker", "worker2"),
            ha_nodes: NodePair::new("control-plane2", "control-plane3"),
            external_target: ("8.8.8.8".to_string(), 53),
            preflight_url: "http://google.com".to_string(),
            preflight_timeout: Duration::from_secs(10),
            fault_delay: Duration::from_secs(5),
            annotation_settle_delay: Duration::from_secs(15),
            gateway_cidr: "10.249.0.1/24".to_string(),
            hot_swap_gateway_cidrs: ("10.249.1.1/24".to_string(), "10.249.2.1/24".to_string()),
            overlay_bridge: "br-ext".to_string(),
            retry: RetryBudget::default(),
            probe: ProbeConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl ScenarioConfig {
    /// Configuration with millisecond pacing for harness self-tests.
    pub fn fast() -> Self {
        Self {
            preflight_timeout: Duration::from_millis(250),
            fault_delay: Duration::from_millis(1),
            annotation_settle_delay: Duration::from_millis(1),
            retry: RetryBudget::fast(),
            probe: ProbeConfig::fast(),
            gateway: GatewayConfig::fast(),
            ..Self::default()
        }
    }

    /// Node pair for the discovered topology mode.
    pub fn nodes_for(&self, mode: TopologyMode) -> &NodePair {
        match mode {
            TopologyMode::SingleControlPlane => &self.worker_nodes,
            TopologyMode::HighlyAvailable => &self.ha_nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_matches_the_polling_contract() {
        let budget = RetryBudget::default();
        assert_eq!(budget.max_attempts, 20);
        assert_eq!(budget.interval, Duration::from_secs(3));
        assert_eq!(budget.total_interval(), Duration::from_secs(60));
    }

    #[test]
    fn verdict_deadline_covers_the_attempt_schedule() {
        let probe = ProbeConfig::default();
        let schedule = (probe.attempt_timeout + probe.attempt_delay) * probe.attempts;
        assert!(probe.verdict_deadline() > schedule);
        assert!(probe.verdict_deadline() > probe.lifecycle_budget.total_interval());
    }

    #[test]
    fn nodes_follow_the_topology_mode() {
        let config = ScenarioConfig::default();
        assert_eq!(
            config.nodes_for(TopologyMode::SingleControlPlane).source,
            "worker"
        );
        assert_eq!(
            config.nodes_for(TopologyMode::HighlyAvailable).source,
            "control-plane2"
        );
    }
}
