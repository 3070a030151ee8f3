//! Shared fixtures for end-to-end harness tests.
//!
//! Scenarios run against the in-memory fakes with millisecond pacing; the
//! fixtures seed the control-plane components and cluster nodes every
//! scenario expects to find.

#![allow(dead_code)]

use std::sync::Once;

use flowprobe::cluster::NODE_SUBNETS_ANNOTATION;
use flowprobe::cluster::fake::{TerminalBehavior, WorkloadBehavior};
use flowprobe::{
    FakeCluster, FakeHostRuntime, ScenarioConfig, ScenarioOrchestrator, TokioTimeProvider,
};

static INIT: Once = Once::new();

/// Route harness logs through the test writer when `RUST_LOG` asks for them.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub struct Fixture {
    pub cluster: FakeCluster,
    pub hosts: FakeHostRuntime,
    pub orchestrator: ScenarioOrchestrator<FakeCluster, FakeHostRuntime, TokioTimeProvider>,
    pub config: ScenarioConfig,
}

fn run_forever() -> WorkloadBehavior {
    WorkloadBehavior {
        polls_until_running: 1,
        polls_until_terminal: 1,
        polls_until_address: 1,
        terminal: TerminalBehavior::RunForever,
    }
}

/// An empty environment: no control-plane components anywhere.
pub fn empty_environment() -> Fixture {
    init_tracing();
    let config = ScenarioConfig::fast();
    let cluster = FakeCluster::new();
    let hosts = FakeHostRuntime::new();
    let orchestrator = ScenarioOrchestrator::new(
        cluster.clone(),
        hosts.clone(),
        TokioTimeProvider::new(),
        config.clone(),
    );
    Fixture {
        cluster,
        hosts,
        orchestrator,
        config,
    }
}

/// A single-control-plane environment: agents on both worker nodes, one
/// controller, node subnets annotated, and cluster nodes known to the host
/// runtime.
pub fn single_control_plane() -> Fixture {
    let fixture = empty_environment();
    let cluster = &fixture.cluster;
    cluster.seed_running("sdn-system", "agent-worker", "worker", "node-agent");
    cluster.seed_running("sdn-system", "agent-worker2", "worker2", "node-agent");
    cluster.seed_running("sdn-system", "controller-0", "control-plane", "controller");
    cluster.set_node_annotation(
        "worker",
        NODE_SUBNETS_ANNOTATION,
        r#"{"default": "10.244.1.0/24"}"#,
    );
    // Long-lived placeholders park until namespace teardown.
    cluster.behavior_for("dst-reach-target", run_forever());
    cluster.behavior_for("gw-consumer", run_forever());

    let hosts = &fixture.hosts;
    hosts.seed_host("worker", "172.18.0.2".parse().expect("addr"));
    hosts.seed_host("worker2", "172.18.0.3".parse().expect("addr"));
    fixture
}

/// A highly available environment: agents live on the control-plane nodes
/// and the worker node set is absent.
pub fn highly_available() -> Fixture {
    let fixture = empty_environment();
    let cluster = &fixture.cluster;
    cluster.seed_running("sdn-system", "agent-cp2", "control-plane2", "node-agent");
    cluster.seed_running("sdn-system", "agent-cp3", "control-plane3", "node-agent");
    cluster.set_node_annotation(
        "control-plane2",
        NODE_SUBNETS_ANNOTATION,
        r#"{"default": "10.244.5.0/24"}"#,
    );
    cluster.behavior_for("dst-reach-target", run_forever());
    cluster.behavior_for("gw-consumer", run_forever());

    let hosts = &fixture.hosts;
    hosts.seed_host("control-plane2", "172.18.0.4".parse().expect("addr"));
    hosts.seed_host("control-plane3", "172.18.0.5".parse().expect("addr"));
    fixture
}
