//! Real cluster backend shelling out to `kubectl`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::traits::ClusterApi;
use super::types::{LifecyclePhase, Workload, WorkloadSpec};
use crate::command::{run_command, run_command_with_stdin};
use crate::error::{HarnessError, HarnessResult};

/// Image used for harness workloads; carries the shell tooling the probe
/// scripts rely on (`nc`, `ping`).
pub const WORKLOAD_IMAGE: &str = "registry.k8s.io/e2e-test-images/agnhost:2.45";

/// Cluster capability backend driving the `kubectl` CLI.
#[derive(Clone, Debug)]
pub struct KubectlCluster {
    program: String,
}

impl Default for KubectlCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl KubectlCluster {
    /// Backend invoking `kubectl` from the path.
    pub fn new() -> Self {
        Self {
            program: "kubectl".to_string(),
        }
    }

    /// Backend invoking an explicit binary, e.g. a kind-scoped wrapper.
    pub fn with_program(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    async fn run(&self, args: &[&str]) -> HarnessResult<String> {
        run_command(&self.program, args).await
    }
}

#[derive(Serialize)]
struct Manifest<'a> {
    #[serde(rename = "apiVersion")]
    api_version: &'a str,
    kind: &'a str,
    metadata: ManifestMetadata<'a>,
    spec: ManifestSpec<'a>,
}

#[derive(Serialize)]
struct ManifestMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct ManifestSpec<'a> {
    containers: Vec<ManifestContainer<'a>>,
    #[serde(rename = "nodeName", skip_serializing_if = "Option::is_none")]
    node_name: Option<&'a str>,
    #[serde(rename = "restartPolicy")]
    restart_policy: &'a str,
}

#[derive(Serialize)]
struct ManifestContainer<'a> {
    name: String,
    image: &'a str,
    command: &'a [String],
}

fn manifest_for(spec: &WorkloadSpec) -> Manifest<'_> {
    Manifest {
        api_version: "v1",
        kind: "Pod",
        metadata: ManifestMetadata {
            name: &spec.name,
            labels: &spec.labels,
        },
        spec: ManifestSpec {
            containers: vec![ManifestContainer {
                name: spec.container_name(),
                image: WORKLOAD_IMAGE,
                command: &spec.command,
            }],
            node_name: spec.node.as_deref(),
            restart_policy: "Never",
        },
    }
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodObject>,
}

#[derive(Debug, Deserialize)]
struct PodObject {
    metadata: ObjectMetadata,
    #[serde(default)]
    spec: PodSpecFields,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
struct ObjectMetadata {
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct PodSpecFields {
    #[serde(rename = "nodeName")]
    node_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PodStatus {
    phase: Option<String>,
    reason: Option<String>,
    #[serde(rename = "podIP")]
    pod_ip: Option<String>,
}

#[derive(Deserialize)]
struct NodeObject {
    metadata: ObjectMetadata,
}

fn workload_from(pod: PodObject) -> Workload {
    let phase = match pod.status.phase.as_deref() {
        Some("Running") => LifecyclePhase::Running,
        Some("Succeeded") => LifecyclePhase::Succeeded,
        Some("Failed") => LifecyclePhase::Failed(
            pod.status
                .reason
                .unwrap_or_else(|| "workload failed".to_string()),
        ),
        Some("Pending") | None => LifecyclePhase::Pending,
        Some(other) => {
            tracing::debug!("pod {} reports phase {other}, treating as pending", pod.metadata.name);
            LifecyclePhase::Pending
        }
    };
    Workload {
        name: pod.metadata.name,
        node: pod.spec.node_name.filter(|node| !node.is_empty()),
        phase,
        address: pod.status.pod_ip.filter(|ip| !ip.is_empty()),
        labels: pod.metadata.labels,
    }
}

fn parse_json<'a, T: Deserialize<'a>>(context: &str, raw: &'a str) -> HarnessResult<T> {
    serde_json::from_str(raw).map_err(|err| HarnessError::ExternalCommand {
        command: context.to_string(),
        reason: format!("malformed JSON output: {err}"),
    })
}

#[async_trait]
impl ClusterApi for KubectlCluster {
    async fn create_workload(&self, namespace: &str, spec: &WorkloadSpec) -> HarnessResult<()> {
        let manifest =
            serde_json::to_string(&manifest_for(spec)).map_err(|err| HarnessError::ExternalCommand {
                command: format!("render manifest for {}", spec.name),
                reason: err.to_string(),
            })?;
        run_command_with_stdin(
            &self.program,
            &["create", "-n", namespace, "-f", "-"],
            &manifest,
        )
        .await?;
        Ok(())
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> HarnessResult<Workload> {
        let raw = self
            .run(&["get", "pod", name, "-n", namespace, "-o", "json"])
            .await?;
        let pod: PodObject = parse_json(&format!("get pod {name}"), &raw)?;
        Ok(workload_from(pod))
    }

    async fn list_workloads(
        &self,
        namespace: &str,
        role: Option<&str>,
        node: Option<&str>,
    ) -> HarnessResult<Vec<Workload>> {
        let mut args = vec![
            "get".to_string(),
            "pods".to_string(),
            "-n".to_string(),
            namespace.to_string(),
            "-o".to_string(),
            "json".to_string(),
        ];
        if let Some(role) = role {
            args.push("-l".to_string());
            args.push(format!("{}={role}", super::types::ROLE_LABEL));
        }
        if let Some(node) = node {
            args.push(format!("--field-selector=spec.nodeName={node}"));
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let raw = self.run(&arg_refs).await?;
        let list: PodList = parse_json("list pods", &raw)?;
        Ok(list.items.into_iter().map(workload_from).collect())
    }

    async fn delete_workload(
        &self,
        namespace: &str,
        name: &str,
        graceful: bool,
    ) -> HarnessResult<()> {
        let mut args = vec!["delete", "pod", name, "-n", namespace];
        if !graceful {
            args.push("--grace-period=0");
            args.push("--force");
        }
        self.run(&args).await?;
        Ok(())
    }

    async fn annotate_namespace(
        &self,
        namespace: &str,
        annotations: &[(String, String)],
        overwrite: bool,
    ) -> HarnessResult<()> {
        let mut args = vec![
            "annotate".to_string(),
            "namespace".to_string(),
            namespace.to_string(),
        ];
        for (key, value) in annotations {
            args.push(format!("{key}={value}"));
        }
        if overwrite {
            args.push("--overwrite".to_string());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs).await?;
        Ok(())
    }

    async fn exec_in_workload(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        command: &[String],
    ) -> HarnessResult<String> {
        let container_flag = format!("--container={container}");
        let mut args = vec![
            "exec",
            name,
            "-n",
            namespace,
            container_flag.as_str(),
            "--",
        ];
        args.extend(command.iter().map(String::as_str));
        self.run(&args).await
    }

    async fn workload_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
    ) -> HarnessResult<String> {
        self.run(&["logs", name, "-n", namespace, "-c", container])
            .await
    }

    async fn node_annotation(&self, node: &str, key: &str) -> HarnessResult<String> {
        let raw = self.run(&["get", "node", node, "-o", "json"]).await?;
        let object: NodeObject = parse_json(&format!("get node {node}"), &raw)?;
        object
            .metadata
            .annotations
            .get(key)
            .cloned()
            .ok_or_else(|| HarnessError::ExternalCommand {
                command: format!("get node {node}"),
                reason: format!("annotation {key} not present"),
            })
    }
}
