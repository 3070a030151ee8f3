//! Core cluster capability trait.

use async_trait::async_trait;

use super::types::{Workload, WorkloadSpec};
use crate::error::HarnessResult;

/// Narrow capability interface over the cluster resource store.
///
/// Everything the harness needs from the control plane goes through this
/// trait, so the orchestration logic runs unchanged against a real cluster
/// ([`KubectlCluster`](super::KubectlCluster)) or an in-memory fake
/// ([`FakeCluster`](super::FakeCluster)).
#[async_trait]
pub trait ClusterApi: Clone + Send + Sync + 'static {
    /// Create a workload in `namespace`.
    async fn create_workload(&self, namespace: &str, spec: &WorkloadSpec) -> HarnessResult<()>;

    /// Fetch the current observed state of a workload.
    async fn get_workload(&self, namespace: &str, name: &str) -> HarnessResult<Workload>;

    /// List workloads in `namespace`, filtered by role label and node when
    /// given. Ordering is deterministic so first-match selection is
    /// reproducible.
    async fn list_workloads(
        &self,
        namespace: &str,
        role: Option<&str>,
        node: Option<&str>,
    ) -> HarnessResult<Vec<Workload>>;

    /// Delete a workload. `graceful = false` requests immediate removal.
    async fn delete_workload(&self, namespace: &str, name: &str, graceful: bool)
    -> HarnessResult<()>;

    /// Set annotations on `namespace`. With `overwrite`, existing values
    /// are replaced; without it, colliding keys are an error.
    async fn annotate_namespace(
        &self,
        namespace: &str,
        annotations: &[(String, String)],
        overwrite: bool,
    ) -> HarnessResult<()>;

    /// Execute a command inside a running workload, returning combined
    /// output.
    async fn exec_in_workload(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        command: &[String],
    ) -> HarnessResult<String>;

    /// Fetch the logs of a workload's container.
    async fn workload_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
    ) -> HarnessResult<String>;

    /// Read an annotation off a node object.
    async fn node_annotation(&self, node: &str, key: &str) -> HarnessResult<String>;
}
