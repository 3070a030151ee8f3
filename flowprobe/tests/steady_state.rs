//! End-to-end steady-state scenarios: a background probe must survive the
//! removal of a control-plane component.

mod common;

use common::single_control_plane;
use flowprobe::HarnessError;
use flowprobe::cluster::fake::{TerminalBehavior, WorkloadBehavior};

#[tokio::test]
async fn connectivity_survives_a_node_agent_kill() {
    let fixture = single_control_plane();

    fixture
        .orchestrator
        .steady_state_under_fault("probe-steady", "node-agent", true)
        .await
        .expect("probe must stay continuously successful");

    // The fault landed on the agent sharing the probe's node, and it was
    // removed non-gracefully.
    let deletions = fixture.cluster.deletions();
    assert_eq!(
        deletions,
        vec![(
            "sdn-system".to_string(),
            "agent-worker".to_string(),
            false
        )]
    );
}

#[tokio::test]
async fn connectivity_survives_a_controller_kill() {
    let fixture = single_control_plane();

    fixture
        .orchestrator
        .steady_state_under_fault("probe-steady", "controller", false)
        .await
        .expect("probe must stay continuously successful");

    let deletions = fixture.cluster.deletions();
    assert_eq!(
        deletions,
        vec![(
            "sdn-system".to_string(),
            "controller-0".to_string(),
            false
        )]
    );
}

#[tokio::test]
async fn missing_fault_target_aborts_before_probing() {
    // No control-plane components anywhere: the predicate matches nothing.
    let fixture = common::empty_environment();

    let err = fixture
        .orchestrator
        .steady_state_under_fault("probe-steady", "node-agent", true)
        .await
        .expect_err("must fail");
    match err {
        HarnessError::FaultTargetNotFound { role, .. } => assert_eq!(role, "node-agent"),
        other => panic!("unexpected error: {other}"),
    }

    // The scenario aborted before the probe workload was ever created.
    assert!(
        !fixture
            .cluster
            .has_workload(&fixture.config.namespace, "probe-steady")
    );
}

#[tokio::test]
async fn a_failing_probe_is_a_probe_failure() {
    let fixture = single_control_plane();
    fixture.cluster.behavior_for(
        "probe-steady",
        WorkloadBehavior {
            polls_until_running: 1,
            polls_until_terminal: 3,
            polls_until_address: 1,
            terminal: TerminalBehavior::Fail("Error".to_string()),
        },
    );
    fixture
        .cluster
        .set_logs(&fixture.config.namespace, "probe-steady", "nc: timed out");

    let err = fixture
        .orchestrator
        .steady_state_under_fault("probe-steady", "node-agent", true)
        .await
        .expect_err("must fail");
    match err {
        HarnessError::ProbeFailure { name, reason } => {
            assert_eq!(name, "probe-steady");
            assert!(reason.contains("Error"));
            assert!(reason.contains("nc: timed out"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn the_fault_lands_between_the_probe_signals() {
    let fixture = single_control_plane();
    // Keep the probe visibly running for a while so the fault demonstrably
    // lands before its verdict exists.
    fixture.cluster.behavior_for(
        "probe-steady",
        WorkloadBehavior {
            polls_until_running: 1,
            polls_until_terminal: 6,
            polls_until_address: 1,
            terminal: TerminalBehavior::Succeed,
        },
    );

    fixture
        .orchestrator
        .steady_state_under_fault("probe-steady", "node-agent", true)
        .await
        .expect("probe must stay continuously successful");

    // Exactly one component was removed, and the probe workload itself
    // was untouched by the fault.
    assert_eq!(fixture.cluster.deletions().len(), 1);
    assert!(
        fixture
            .cluster
            .has_workload(&fixture.config.namespace, "probe-steady")
    );
}
