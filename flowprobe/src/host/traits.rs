//! Core host runtime capability trait.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::HarnessResult;

/// Narrow capability interface over the container runtime hosting
/// simulated external gateways.
///
/// Cluster nodes themselves are host processes in the same runtime, so the
/// orchestrator also uses this trait to read a node's own address (the
/// cluster-side VTEP).
#[async_trait]
pub trait HostRuntime: Clone + Send + Sync + 'static {
    /// Create a privileged, long-running host process named `name`.
    async fn create_host(&self, name: &str) -> HarnessResult<()>;

    /// The address assigned to a host on its primary interface, validated
    /// as well-formed before being returned.
    async fn host_address(&self, name: &str) -> HarnessResult<IpAddr>;

    /// Run a command inside the host, returning combined output.
    async fn run_in_host(&self, name: &str, command: &[String]) -> HarnessResult<String>;

    /// Forcefully remove a host process.
    async fn remove_host(&self, name: &str) -> HarnessResult<()>;
}
