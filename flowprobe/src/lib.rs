//! # Flowprobe
//!
//! End-to-end connectivity verification for SDN control planes running on
//! multi-node container clusters.
//!
//! Flowprobe validates that an SDN data path keeps forwarding while the
//! control plane is disturbed: workloads are created and awaited through
//! their lifecycle, addresses are resolved under eventual consistency,
//! background probes run concurrently with control-plane fault injection,
//! and a simulated external gateway is provisioned, hot-swapped, and torn
//! down, leak-free whatever the scenario outcome.
//!
//! External collaborators are consumed through narrow capability traits
//! ([`ClusterApi`], [`HostRuntime`]) with CLI-backed production
//! implementations and in-memory fakes side by side, so the orchestration
//! logic runs unchanged against a real cluster or a scripted one.
//!
//! ## Scenario shape
//!
//! ```text
//! ScenarioOrchestrator
//!   ├── preflight (internet egress sanity check)
//!   ├── topology discovery → TopologyMode
//!   ├── resource creation (LifecycleWaiter, AddressResolver)
//!   ├── ConnectivityProbe task ── concurrent ── ChaosInjector
//!   │        │ TargetObservable        │         or GatewaySimulator
//!   │        └──── Finished ◄──────────┘
//!   ├── assertion
//!   └── guaranteed teardown
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Deterministic control-plane fault injection.
pub mod chaos;
/// Cluster capability trait, observed types, real and fake backends.
pub mod cluster;
mod command;
/// Configuration structures for scenario behavior.
pub mod config;
/// Error types for harness operations.
pub mod error;
/// Simulated external gateway lifecycle.
pub mod gateway;
/// Host runtime capability trait, real and fake backends.
pub mod host;
/// Workload lifecycle waiting with diagnostic log capture.
pub mod lifecycle;
/// Background connectivity probing with ordered signals.
pub mod probe;
/// Address resolution under eventual consistency.
pub mod resolve;
/// Budgeted polling for eventually consistent queries.
pub mod retry;
/// Scenario orchestration, topology discovery, and teardown.
pub mod scenario;
/// Time provider abstraction for polling loops and deadlines.
pub mod time;

// Public API exports
pub use chaos::{ChaosInjector, FaultSelector, FaultTarget, InjectionState};
pub use cluster::{
    ClusterApi, FakeCluster, GatewayAnnotation, KubectlCluster, LifecyclePhase, Workload,
    WorkloadSpec,
};
pub use config::{GatewayConfig, NodePair, ProbeConfig, RetryBudget, ScenarioConfig};
pub use error::{HarnessError, HarnessResult, ResourceKind, TeardownError};
pub use gateway::{GatewayEndpoint, GatewaySimulator};
pub use host::{DockerRuntime, FakeHostRuntime, HostRuntime};
pub use lifecycle::{LifecycleOutcome, LifecycleWaiter};
pub use probe::{ConnectivityProbe, ProbeHandle, ProbeResult, ProbeSignal, ProbeTarget};
pub use resolve::AddressResolver;
pub use scenario::{ScenarioOrchestrator, TopologyMode};
pub use time::{TimeProvider, TokioTimeProvider};
