//! Scenario orchestration: composition, assertion, and guaranteed teardown.
//!
//! Every scenario follows the same sequence: preflight egress check,
//! topology discovery, per-scenario resource creation, the scenario's
//! interleaving of probe / fault / reconfiguration, outcome assertion, and
//! unconditional teardown of scenario-owned hosts. The preflight runs once
//! per environment from the test-runner bootstrap; everything else lives
//! here.

use std::collections::BTreeMap;
use std::net::IpAddr;

use tokio_util::sync::CancellationToken;

use crate::chaos::{ChaosInjector, FaultSelector};
use crate::cluster::{
    ClusterApi, GatewayAnnotation, NODE_SUBNETS_ANNOTATION, WorkloadSpec, container_name,
};
use crate::command::argv;
use crate::config::ScenarioConfig;
use crate::error::{HarnessError, HarnessResult, ResourceKind, TeardownError};
use crate::gateway::{GatewayEndpoint, GatewaySimulator};
use crate::host::HostRuntime;
use crate::lifecycle::{LifecycleOutcome, LifecycleWaiter};
use crate::probe::{ConnectivityProbe, ProbeTarget};
use crate::resolve::AddressResolver;
use crate::time::TimeProvider;

/// Flow-table verification helpers
pub mod flows;

/// Environment egress sanity check
pub mod preflight;

/// Topology mode discovery
pub mod topology;

pub use topology::TopologyMode;

const DST_WORKLOAD: &str = "dst-reach-target";
const SRC_PROBE: &str = "src-reach-probe";
const GATEWAY_PROBE: &str = "gateway-reach-probe";
const CONSUMER_WORKLOAD: &str = "gw-consumer";
const GATEWAY_HOST: &str = "gw-sim";
const GATEWAY_HOST_A: &str = "gw-sim-a";
const GATEWAY_HOST_B: &str = "gw-sim-b";

// Long-lived placeholder workloads just park until namespace teardown.
const PLACEHOLDER_SCRIPT: &str = "sleep 20000";

/// Composes the harness components into end-to-end scenarios.
///
/// The orchestrator owns no background concurrency beyond the probe tasks
/// it spawns; shared state (the namespace annotation, the gateway host
/// set) is mutated only from the orchestrating task, serialized by each
/// scenario's phase structure.
#[derive(Clone, Debug)]
pub struct ScenarioOrchestrator<C, H, T> {
    cluster: C,
    hosts: H,
    time: T,
    config: ScenarioConfig,
}

impl<C: ClusterApi, H: HostRuntime, T: TimeProvider> ScenarioOrchestrator<C, H, T> {
    /// Orchestrator over the given collaborators.
    pub fn new(cluster: C, hosts: H, time: T, config: ScenarioConfig) -> Self {
        Self {
            cluster,
            hosts,
            time,
            config,
        }
    }

    /// The scenario configuration in effect.
    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Environment sanity check; fatal without internet egress.
    pub async fn preflight(&self) -> HarnessResult<()> {
        preflight::check_external_egress(&self.config.preflight_url, self.config.preflight_timeout)
            .await
    }

    /// Probe for the SDN agent and derive the topology mode.
    pub async fn discover_topology(&self) -> HarnessResult<TopologyMode> {
        topology::discover(&self.cluster, &self.config).await
    }

    /// Background-probe an external target while one control-plane
    /// component is removed; the probe must stay continuously successful.
    ///
    /// With `node_scoped`, the fault target is the `role` workload on the
    /// probe's own node; otherwise the first `role` workload anywhere in
    /// the control-plane namespace. The fault is injected strictly between
    /// the probe's "target observable" signal and its verdict.
    pub async fn steady_state_under_fault(
        &self,
        probe_name: &str,
        role: &str,
        node_scoped: bool,
    ) -> HarnessResult<()> {
        // A scenario without any fault candidate is unrunnable; check
        // before spending a probe workload on it.
        let candidates = self
            .cluster
            .list_workloads(&self.config.control_plane_namespace, Some(role), None)
            .await?;
        if candidates.is_empty() {
            return Err(HarnessError::FaultTargetNotFound {
                role: role.to_string(),
                node: None,
            });
        }

        let (host, port) = self.config.external_target.clone();
        let cancel = CancellationToken::new();
        let _probe_guard = cancel.clone().drop_guard();
        let mut handle = self.prober().spawn(
            &self.config.namespace,
            probe_name,
            None,
            ProbeTarget::Tcp { host, port },
            cancel,
        );

        let observed = handle.target_observable().await?;

        // Let traffic flow before the component dies.
        self.time.sleep(self.config.fault_delay).await;

        let selector = if node_scoped {
            let node = observed.node.clone().ok_or_else(|| {
                HarnessError::InvalidState(format!(
                    "probe {probe_name} is observable but reports no node"
                ))
            })?;
            FaultSelector::role_on_node(role, &node)
        } else {
            FaultSelector::role(role)
        };
        let mut injector =
            ChaosInjector::new(self.cluster.clone(), &self.config.control_plane_namespace);
        injector.select_target(&selector).await?;
        injector.inject().await?;

        let result = handle.verdict().await?;
        if result.success {
            tracing::info!("probe {probe_name} stayed continuously successful through the fault");
            Ok(())
        } else {
            Err(HarnessError::ProbeFailure {
                name: probe_name.to_string(),
                reason: result
                    .error
                    .unwrap_or_else(|| "probe reported failure".to_string()),
            })
        }
    }

    /// Create a destination workload on one node and verify a workload on
    /// another node reaches it.
    ///
    /// With `verify_bridge_cold`, additionally require that the overlay
    /// bridge on the source node saw zero packets toward the destination;
    /// inter-node traffic must not traverse the external-gateway path.
    pub async fn inter_node_connectivity(&self, verify_bridge_cold: bool) -> HarnessResult<()> {
        let mode = self.discover_topology().await?;
        let nodes = self.config.nodes_for(mode).clone();
        tracing::info!(
            "verifying {} -> {} connectivity in {mode} mode",
            nodes.source,
            nodes.destination
        );

        self.create_placeholder(DST_WORKLOAD, &nodes.destination)
            .await?;
        let resolver = AddressResolver::new(
            self.cluster.clone(),
            self.time.clone(),
            self.config.retry,
        );
        let target = resolver
            .resolve(&self.config.namespace, DST_WORKLOAD)
            .await?;
        tracing::info!("destination target for {DST_WORKLOAD} is {target}");

        let result = self
            .prober()
            .run_to_completion(
                &self.config.namespace,
                SRC_PROBE,
                Some(&nodes.source),
                ProbeTarget::Icmp {
                    host: target.to_string(),
                },
            )
            .await?;
        if !result.success {
            return Err(HarnessError::ProbeFailure {
                name: SRC_PROBE.to_string(),
                reason: result
                    .error
                    .unwrap_or_else(|| "probe reported failure".to_string()),
            });
        }

        if verify_bridge_cold {
            self.verify_bridge_cold(&nodes.source, &target.to_string())
                .await?;
        }
        Ok(())
    }

    /// Provision a simulated external gateway, redirect the namespace at
    /// it, and verify a workload reaches the gateway address through the
    /// tunnel. Gateway hosts are torn down whatever the outcome.
    pub async fn external_gateway_reachability(&self) -> HarnessResult<()> {
        let mut gateways = self.gateway_simulator();
        let result = self.run_external_gateway(&mut gateways).await;
        Self::finish(result, gateways.teardown().await)
    }

    /// Verify consumers follow a namespace-annotation hot swap from one
    /// simulated gateway to a replacement without being recreated. Both
    /// gateway hosts are torn down whatever the outcome.
    pub async fn gateway_hot_swap(&self) -> HarnessResult<()> {
        let mut gateways = self.gateway_simulator();
        let result = self.run_gateway_hot_swap(&mut gateways).await;
        Self::finish(result, gateways.teardown().await)
    }

    async fn run_external_gateway(
        &self,
        gateways: &mut GatewaySimulator<H, T>,
    ) -> HarnessResult<()> {
        let mode = self.discover_topology().await?;
        let nodes = self.config.nodes_for(mode).clone();
        let cluster_vtep = self.hosts.host_address(&nodes.source).await?;
        tracing::info!("cluster-side vtep is node {} at {cluster_vtep}", nodes.source);
        let pod_cidr = self.pod_cidr(&nodes.source).await?;

        let endpoint = gateways
            .provision(
                GATEWAY_HOST,
                cluster_vtep,
                &self.config.gateway_cidr,
                &pod_cidr,
            )
            .await?;
        self.annotate_gateway(&endpoint, false).await?;
        self.time.sleep(self.config.annotation_settle_delay).await;

        let result = self
            .prober()
            .run_to_completion(
                &self.config.namespace,
                GATEWAY_PROBE,
                Some(&nodes.source),
                ProbeTarget::Icmp {
                    host: endpoint.gateway.to_string(),
                },
            )
            .await?;
        if result.success {
            Ok(())
        } else {
            Err(HarnessError::ProbeFailure {
                name: GATEWAY_PROBE.to_string(),
                reason: result
                    .error
                    .unwrap_or_else(|| "probe reported failure".to_string()),
            })
        }
    }

    async fn run_gateway_hot_swap(
        &self,
        gateways: &mut GatewaySimulator<H, T>,
    ) -> HarnessResult<()> {
        let mode = self.discover_topology().await?;
        let nodes = self.config.nodes_for(mode).clone();
        let cluster_vtep = self.hosts.host_address(&nodes.source).await?;
        let pod_cidr = self.pod_cidr(&nodes.source).await?;
        let (first_cidr, second_cidr) = self.config.hot_swap_gateway_cidrs.clone();

        let first = gateways
            .provision(GATEWAY_HOST_A, cluster_vtep, &first_cidr, &pod_cidr)
            .await?;
        self.annotate_gateway(&first, false).await?;

        // The consumer outlives the swap; it is never recreated.
        self.create_placeholder(CONSUMER_WORKLOAD, &nodes.source)
            .await?;
        let resolver = AddressResolver::new(
            self.cluster.clone(),
            self.time.clone(),
            self.config.retry,
        );
        let consumer_address = resolver
            .resolve(&self.config.namespace, CONSUMER_WORKLOAD)
            .await?;
        tracing::info!("consumer workload {CONSUMER_WORKLOAD} is at {consumer_address}");

        self.time.sleep(self.config.annotation_settle_delay).await;
        self.ping_from_workload(CONSUMER_WORKLOAD, first.gateway)
            .await?;

        let second = gateways
            .provision(GATEWAY_HOST_B, cluster_vtep, &second_cidr, &pod_cidr)
            .await?;
        // Hot swap: overwriting the annotation redirects the consumer in
        // place. The first endpoint is not torn down here; both stay live
        // until scenario teardown.
        self.annotate_gateway(&second, true).await?;
        self.time.sleep(self.config.annotation_settle_delay).await;
        self.ping_from_workload(CONSUMER_WORKLOAD, second.gateway)
            .await?;

        // Post-swap traffic must match the new route only.
        self.verify_bridge_cold(&nodes.source, &first.gateway.to_string())
            .await?;
        Ok(())
    }

    fn prober(&self) -> ConnectivityProbe<C, T> {
        ConnectivityProbe::new(
            self.cluster.clone(),
            self.time.clone(),
            self.config.probe.clone(),
        )
    }

    fn gateway_simulator(&self) -> GatewaySimulator<H, T> {
        GatewaySimulator::new(
            self.hosts.clone(),
            self.time.clone(),
            self.config.gateway.clone(),
        )
    }

    /// Create a long-lived placeholder workload and wait for it to leave
    /// pending.
    async fn create_placeholder(&self, name: &str, node: &str) -> HarnessResult<()> {
        let spec = WorkloadSpec::shell(name, Some(node), PLACEHOLDER_SCRIPT);
        self.cluster
            .create_workload(&self.config.namespace, &spec)
            .await
            .map_err(|err| HarnessError::ResourceCreation {
                kind: ResourceKind::Workload,
                name: name.to_string(),
                reason: err.to_string(),
            })?;
        let waiter = LifecycleWaiter::new(
            self.cluster.clone(),
            self.time.clone(),
            self.config.retry,
        );
        match waiter
            .wait_until_scheduled(&self.config.namespace, name, &spec.container_name())
            .await
        {
            LifecycleOutcome::ScheduledRunning | LifecycleOutcome::Succeeded => Ok(()),
            LifecycleOutcome::Failed { reason, .. } => Err(HarnessError::ResourceCreation {
                kind: ResourceKind::Workload,
                name: name.to_string(),
                reason: format!("workload failed while starting: {reason}"),
            }),
            LifecycleOutcome::TimedOut => Err(HarnessError::SchedulingTimeout {
                name: name.to_string(),
                attempts: self.config.retry.max_attempts,
            }),
        }
    }

    /// Read the workload address range routed to `node` from its subnet
    /// annotation, a JSON object keyed by network name.
    async fn pod_cidr(&self, node: &str) -> HarnessResult<String> {
        let context = format!("node {node} subnet annotation");
        let raw = self
            .cluster
            .node_annotation(node, NODE_SUBNETS_ANNOTATION)
            .await?;
        let subnets: BTreeMap<String, String> =
            serde_json::from_str(&raw).map_err(|err| HarnessError::ExternalCommand {
                command: context.clone(),
                reason: format!("malformed subnet JSON: {err}"),
            })?;
        let cidr = subnets
            .get("default")
            .cloned()
            .ok_or_else(|| HarnessError::ExternalCommand {
                command: context,
                reason: "no default subnet".to_string(),
            })?;
        tracing::info!("workload cidr for node {node} is {cidr}");
        Ok(cidr)
    }

    async fn annotate_gateway(
        &self,
        endpoint: &GatewayEndpoint,
        overwrite: bool,
    ) -> HarnessResult<()> {
        let annotation = GatewayAnnotation {
            external_gateway: endpoint.gateway,
            vtep: endpoint.vtep,
        };
        tracing::info!(
            "redirecting namespace {} to gateway {} via vtep {} (overwrite: {overwrite})",
            self.config.namespace,
            endpoint.gateway,
            endpoint.vtep
        );
        self.cluster
            .annotate_namespace(&self.config.namespace, &annotation.to_pairs(), overwrite)
            .await
    }

    /// Bounded ping from inside an existing workload.
    async fn ping_from_workload(&self, workload: &str, target: IpAddr) -> HarnessResult<()> {
        let deadline = self
            .config
            .probe
            .attempt_timeout
            .as_secs()
            .max(1)
            .to_string();
        let command = argv(&["ping", "-w", &deadline, &target.to_string()]);
        self.cluster
            .exec_in_workload(
                &self.config.namespace,
                workload,
                &container_name(workload),
                &command,
            )
            .await
            .map_err(|err| HarnessError::ProbeFailure {
                name: workload.to_string(),
                reason: format!("could not reach {target}: {err}"),
            })?;
        Ok(())
    }

    /// Dump the overlay bridge flows on `node`'s agent and require zero
    /// packets toward `target`.
    async fn verify_bridge_cold(&self, node: &str, target: &str) -> HarnessResult<()> {
        let namespace = &self.config.control_plane_namespace;
        let role = &self.config.node_agent_role;
        let agents = self
            .cluster
            .list_workloads(namespace, Some(role), Some(node))
            .await?;
        let agent =
            agents
                .into_iter()
                .next()
                .ok_or_else(|| HarnessError::TopologyNotDiscovered {
                    role: role.clone(),
                })?;
        // Control-plane containers are named after their role.
        let dump = self
            .cluster
            .exec_in_workload(
                namespace,
                &agent.name,
                role,
                &argv(&["ovs-ofctl", "dump-flows", &self.config.overlay_bridge]),
            )
            .await?;
        flows::assert_path_cold(&dump, target)
    }

    /// Combine a scenario result with its teardown result.
    ///
    /// The scenario error wins; a teardown failure surfaces on its own
    /// only when the scenario body passed, and is logged otherwise.
    fn finish(result: HarnessResult<()>, cleanup: Result<(), TeardownError>) -> HarnessResult<()> {
        match (result, cleanup) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(teardown)) => Err(HarnessError::Teardown(teardown)),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(teardown)) => {
                tracing::error!("teardown also failed after scenario error: {teardown}");
                Err(err)
            }
        }
    }
}
