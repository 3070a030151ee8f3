//! End-to-end inter-node connectivity scenarios.

mod common;

use common::{highly_available, single_control_plane};
use flowprobe::ClusterApi;
use flowprobe::HarnessError;

#[tokio::test]
async fn pods_on_separate_nodes_reach_each_other() {
    let fixture = single_control_plane();

    fixture
        .orchestrator
        .inter_node_connectivity(false)
        .await
        .expect("destination must be reachable");

    // Destination placeholder and source probe both exist in the
    // scenario namespace.
    let names = fixture.cluster.workload_names(&fixture.config.namespace);
    assert!(names.contains(&"dst-reach-target".to_string()));
    assert!(names.contains(&"src-reach-probe".to_string()));
}

#[tokio::test]
async fn overlay_bridge_stays_cold_for_inter_node_traffic() {
    let fixture = single_control_plane();
    // The agent's flow table mentions unrelated targets only; nothing
    // toward the destination moved a counter.
    fixture.cluster.script_exec(
        "dump-flows",
        " cookie=0x0, n_packets=44, n_bytes=3900, priority=100,ip,nw_dst=192.0.2.1 actions=output:2\n \
         cookie=0x0, n_packets=9, n_bytes=754, priority=0 actions=NORMAL",
    );

    fixture
        .orchestrator
        .inter_node_connectivity(true)
        .await
        .expect("bridge must stay cold");

    // The dump was taken from the agent on the source node.
    let execs = fixture.cluster.exec_log();
    assert!(
        execs
            .iter()
            .any(|(workload, command)| workload == "agent-worker"
                && command.contains("dump-flows br-ext"))
    );
}

#[tokio::test]
async fn ha_environments_fall_back_to_the_control_plane_nodes() {
    let fixture = highly_available();

    fixture
        .orchestrator
        .inter_node_connectivity(false)
        .await
        .expect("destination must be reachable in ha mode");

    // The destination landed on the ha node set.
    let dst = fixture
        .cluster
        .list_workloads(&fixture.config.namespace, None, Some("control-plane3"))
        .await
        .expect("list");
    assert!(dst.iter().any(|w| w.name == "dst-reach-target"));
}

#[tokio::test]
async fn discovery_failure_aborts_the_scenario() {
    let fixture = common::empty_environment();

    let err = fixture
        .orchestrator
        .inter_node_connectivity(false)
        .await
        .expect_err("must fail");
    assert!(matches!(err, HarnessError::TopologyNotDiscovered { .. }));
    assert!(
        fixture
            .cluster
            .workload_names(&fixture.config.namespace)
            .is_empty()
    );
}
