//! Cluster capability layer.
//!
//! This module provides the trait-based cluster access that allows
//! seamless swapping between the real `kubectl`-backed control plane and
//! an in-memory fake for harness self-tests.

/// In-memory fake implementation for testing
pub mod fake;

/// Real implementation driving the `kubectl` CLI
pub mod kubectl;

/// Core cluster capability trait
pub mod traits;

/// Observed object types and well-known keys
pub mod types;

// Re-export main trait
pub use traits::ClusterApi;

// Re-export implementations
pub use fake::{FakeCluster, TerminalBehavior, WorkloadBehavior};
pub use kubectl::{KubectlCluster, WORKLOAD_IMAGE};

// Re-export observed types
pub use types::{
    EXTERNAL_GATEWAY_ANNOTATION, GatewayAnnotation, LifecyclePhase, NODE_SUBNETS_ANNOTATION,
    ROLE_LABEL, VTEP_ANNOTATION, Workload, WorkloadSpec, container_name,
};
