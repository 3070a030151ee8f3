//! Simulated external gateway lifecycle.
//!
//! A gateway endpoint is provisioned through a strictly ordered sequence:
//! host creation, address resolution, tunnel interface creation, tunnel
//! activation, loopback address assignment, route installation. Each step
//! is fatal on failure, and a [`GatewayEndpoint`] value only exists once
//! all of them succeeded; partial configuration is never "ready".

use std::net::IpAddr;

use crate::command::argv;
use crate::config::GatewayConfig;
use crate::error::{HarnessError, HarnessResult, ResourceKind, TeardownError};
use crate::host::HostRuntime;
use crate::time::TimeProvider;

/// A fully configured simulated gateway endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEndpoint {
    /// Host process standing in for the gateway.
    pub host: String,
    /// Address of the host itself, the VTEP consumers encapsulate toward.
    pub vtep: IpAddr,
    /// Gateway address answered from the host loopback.
    pub gateway: IpAddr,
    /// Loopback CIDR assigned on the host.
    pub loopback_cidr: String,
    /// Virtual network identifier of the tunnel.
    pub tunnel_id: u32,
    /// UDP encapsulation port of the tunnel.
    pub encapsulation_port: u16,
    /// Remote endpoint the tunnel decapsulates from (cluster-side VTEP).
    pub remote: IpAddr,
    /// Workload address range routed over the tunnel.
    pub routed_pod_cidr: String,
}

/// Owns every simulated gateway host created during a scenario.
///
/// Hosts are recorded at creation time, before any configuration step, so
/// teardown removes them even when a later step failed. During a hot swap
/// the superseded endpoint is deliberately left live; both endpoints
/// coexist until scenario teardown.
#[derive(Clone, Debug)]
pub struct GatewaySimulator<H, T> {
    runtime: H,
    time: T,
    config: GatewayConfig,
    hosts: Vec<String>,
}

impl<H: HostRuntime, T: TimeProvider> GatewaySimulator<H, T> {
    /// Simulator over the given host runtime.
    pub fn new(runtime: H, time: T, config: GatewayConfig) -> Self {
        Self {
            runtime,
            time,
            config,
            hosts: Vec::new(),
        }
    }

    /// Hosts created so far, in creation order.
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Provision a new gateway endpoint on a fresh host.
    ///
    /// `remote` is the cluster-side VTEP the tunnel encapsulates toward,
    /// `gateway_cidr` is assigned on the host loopback so the host answers
    /// as the gateway, and `pod_cidr` is routed back over the tunnel.
    pub async fn provision(
        &mut self,
        host: &str,
        remote: IpAddr,
        gateway_cidr: &str,
        pod_cidr: &str,
    ) -> HarnessResult<GatewayEndpoint> {
        let gateway = gateway_from_cidr(gateway_cidr)?;

        self.runtime
            .create_host(host)
            .await
            .map_err(|err| HarnessError::ResourceCreation {
                kind: ResourceKind::Host,
                name: host.to_string(),
                reason: err.to_string(),
            })?;
        // Recorded before configuration: a half-configured host is still
        // an external process leak if teardown misses it.
        self.hosts.push(host.to_string());

        let vtep = self.runtime.host_address(host).await?;
        tracing::info!("external gateway host {host} is at {vtep}");

        let ifname = &self.config.tunnel_ifname;
        let tunnel_id = self.config.tunnel_id.to_string();
        let encap_port = self.config.encapsulation_port.to_string();
        let remote_address = remote.to_string();
        self.runtime
            .run_in_host(
                host,
                &argv(&[
                    "ip",
                    "link",
                    "add",
                    ifname,
                    "type",
                    "vxlan",
                    "dev",
                    &self.config.parent_device,
                    "id",
                    &tunnel_id,
                    "dstport",
                    &encap_port,
                    "remote",
                    &remote_address,
                ]),
            )
            .await?;
        self.runtime
            .run_in_host(host, &argv(&["ip", "link", "set", ifname, "up"]))
            .await?;
        self.runtime
            .run_in_host(
                host,
                &argv(&["ip", "address", "add", gateway_cidr, "dev", "lo"]),
            )
            .await?;
        self.runtime
            .run_in_host(host, &argv(&["ip", "route", "add", pod_cidr, "dev", ifname]))
            .await?;

        if !self.config.stabilization_delay.is_zero() {
            // Give the host time to come up and stabilize.
            self.time.sleep(self.config.stabilization_delay).await;
        }

        tracing::info!("gateway {gateway} ready on {host}, routing {pod_cidr} via {ifname}");
        Ok(GatewayEndpoint {
            host: host.to_string(),
            vtep,
            gateway,
            loopback_cidr: gateway_cidr.to_string(),
            tunnel_id: self.config.tunnel_id,
            encapsulation_port: self.config.encapsulation_port,
            remote,
            routed_pod_cidr: pod_cidr.to_string(),
        })
    }

    /// Remove every host created during the scenario.
    ///
    /// Runs unconditionally and never short-circuits: each removal is
    /// attempted and failures accumulate into a single [`TeardownError`].
    pub async fn teardown(&mut self) -> Result<(), TeardownError> {
        let mut failures = Vec::new();
        for host in self.hosts.drain(..) {
            match self.runtime.remove_host(&host).await {
                Ok(()) => tracing::info!("removed gateway host {host}"),
                Err(err) => {
                    tracing::error!("failed to remove gateway host {host}: {err}");
                    failures.push((host, err));
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError { failures })
        }
    }
}

fn gateway_from_cidr(cidr: &str) -> HarnessResult<IpAddr> {
    cidr.split('/')
        .next()
        .and_then(|address| address.parse().ok())
        .ok_or_else(|| {
            HarnessError::InvalidState(format!("malformed gateway CIDR {cidr:?}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FakeHostRuntime;
    use crate::time::TokioTimeProvider;

    fn simulator(
        runtime: &FakeHostRuntime,
    ) -> GatewaySimulator<FakeHostRuntime, TokioTimeProvider> {
        GatewaySimulator::new(
            runtime.clone(),
            TokioTimeProvider::new(),
            GatewayConfig::fast(),
        )
    }

    fn remote() -> IpAddr {
        "172.18.0.2".parse().expect("addr")
    }

    #[tokio::test]
    async fn provisioning_steps_run_in_order() {
        let runtime = FakeHostRuntime::new();
        let mut gateways = simulator(&runtime);

        let endpoint = gateways
            .provision("gw-sim", remote(), "10.249.0.1/24", "10.244.1.0/24")
            .await
            .expect("provision");

        assert_eq!(endpoint.gateway.to_string(), "10.249.0.1");
        assert_eq!(endpoint.vtep.to_string(), "172.18.0.11");
        assert_eq!(endpoint.tunnel_id, 4097);
        assert_eq!(endpoint.encapsulation_port, 4789);

        let commands = runtime.commands_for("gw-sim");
        assert_eq!(commands.len(), 4);
        assert!(commands[0].starts_with("ip link add vxlan0 type vxlan"));
        assert!(commands[0].contains("id 4097"));
        assert!(commands[0].contains("dstport 4789"));
        assert!(commands[0].contains("remote 172.18.0.2"));
        assert_eq!(commands[1], "ip link set vxlan0 up");
        assert_eq!(commands[2], "ip address add 10.249.0.1/24 dev lo");
        assert_eq!(commands[3], "ip route add 10.244.1.0/24 dev vxlan0");
    }

    #[tokio::test]
    async fn partial_failure_yields_no_endpoint_but_still_tears_down() {
        let runtime = FakeHostRuntime::new();
        runtime.fail_commands_containing("ip route add");
        let mut gateways = simulator(&runtime);

        let err = gateways
            .provision("gw-sim", remote(), "10.249.0.1/24", "10.244.1.0/24")
            .await
            .expect_err("route install must fail");
        assert!(matches!(err, HarnessError::ExternalCommand { .. }));

        // The half-configured host is still owned and torn down.
        assert_eq!(gateways.hosts(), ["gw-sim"]);
        gateways.teardown().await.expect("teardown");
        assert_eq!(runtime.removed_hosts(), vec!["gw-sim"]);
    }

    #[tokio::test]
    async fn teardown_accumulates_failures_without_short_circuiting() {
        let runtime = FakeHostRuntime::new();
        runtime.fail_removal_of("gw-sim-a");
        let mut gateways = simulator(&runtime);
        gateways
            .provision("gw-sim-a", remote(), "10.249.1.1/24", "10.244.1.0/24")
            .await
            .expect("provision a");
        gateways
            .provision("gw-sim-b", remote(), "10.249.2.1/24", "10.244.1.0/24")
            .await
            .expect("provision b");

        let err = gateways.teardown().await.expect_err("teardown must fail");
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].0, "gw-sim-a");
        // The second host was still removed.
        assert_eq!(runtime.removed_hosts(), vec!["gw-sim-b"]);
        assert!(gateways.hosts().is_empty());
    }

    #[tokio::test]
    async fn malformed_gateway_cidr_fails_before_creating_anything() {
        let runtime = FakeHostRuntime::new();
        let mut gateways = simulator(&runtime);
        let err = gateways
            .provision("gw-sim", remote(), "not-a-cidr", "10.244.1.0/24")
            .await
            .expect_err("must fail");
        assert!(matches!(err, HarnessError::InvalidState(_)));
        assert!(gateways.hosts().is_empty());
        assert!(runtime.live_hosts().is_empty());
    }
}
