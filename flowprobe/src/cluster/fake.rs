//! In-memory cluster backend for harness self-tests.
//!
//! The fake mirrors the eventually consistent behavior the harness is
//! built to tolerate: workloads advance through their lifecycle one
//! status poll at a time, addresses show up late, and individual queries
//! can be scripted to fail transiently.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::traits::ClusterApi;
use super::types::{LifecyclePhase, ROLE_LABEL, Workload, WorkloadSpec};
use crate::error::{HarnessError, HarnessResult};

const DEFAULT_NODE: &str = "worker";

/// Scripted terminal phase for a fake workload.
#[derive(Clone, Debug)]
pub enum TerminalBehavior {
    /// Reach `Succeeded` once the running polls are spent.
    Succeed,
    /// Reach `Failed` with the given reason.
    Fail(String),
    /// Stay `Running` forever (long-lived placeholder workloads).
    RunForever,
}

/// Scripted lifecycle pacing for fake workloads.
///
/// Each `get` of the workload counts as one status poll.
#[derive(Clone, Debug)]
pub struct WorkloadBehavior {
    /// Status polls before the workload leaves `Pending`.
    pub polls_until_running: u32,
    /// Additional polls spent `Running` before the terminal phase.
    pub polls_until_terminal: u32,
    /// Status polls before an address becomes visible.
    pub polls_until_address: u32,
    /// Phase reached after the running polls are spent.
    pub terminal: TerminalBehavior,
}

impl Default for WorkloadBehavior {
    fn default() -> Self {
        Self {
            polls_until_running: 1,
            polls_until_terminal: 1,
            polls_until_address: 1,
            terminal: TerminalBehavior::Succeed,
        }
    }
}

#[derive(Debug)]
struct FakeWorkload {
    node: Option<String>,
    labels: BTreeMap<String, String>,
    behavior: WorkloadBehavior,
    polls_seen: u32,
    address: String,
}

impl FakeWorkload {
    fn phase(&self) -> LifecyclePhase {
        let running_after = self.behavior.polls_until_running;
        let terminal_after = running_after + self.behavior.polls_until_terminal;
        if self.polls_seen <= running_after {
            LifecyclePhase::Pending
        } else if self.polls_seen <= terminal_after {
            LifecyclePhase::Running
        } else {
            match &self.behavior.terminal {
                TerminalBehavior::Succeed => LifecyclePhase::Succeeded,
                TerminalBehavior::Fail(reason) => LifecyclePhase::Failed(reason.clone()),
                TerminalBehavior::RunForever => LifecyclePhase::Running,
            }
        }
    }

    fn observed(&self, name: &str) -> Workload {
        let address = (self.polls_seen > self.behavior.polls_until_address)
            .then(|| self.address.clone());
        Workload {
            name: name.to_string(),
            node: self.node.clone(),
            phase: self.phase(),
            address,
            labels: self.labels.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct FakeClusterState {
    workloads: BTreeMap<(String, String), FakeWorkload>,
    annotations: BTreeMap<String, BTreeMap<String, String>>,
    node_annotations: BTreeMap<(String, String), String>,
    behaviors: Vec<(String, WorkloadBehavior)>,
    exec_responses: Vec<(String, String)>,
    exec_failures: Vec<String>,
    exec_log: Vec<(String, String)>,
    logs: BTreeMap<(String, String), String>,
    deletions: Vec<(String, String, bool)>,
    fail_log_fetch_for: BTreeSet<String>,
    fail_creation_of: BTreeSet<String>,
    transient_get_failures: u32,
    created: u32,
}

/// In-memory, scriptable `ClusterApi` implementation.
///
/// Clones share state, so a clone handed to a spawned probe task observes
/// the same cluster as the test body.
#[derive(Clone, Debug, Default)]
pub struct FakeCluster {
    inner: Arc<Mutex<FakeClusterState>>,
}

impl FakeCluster {
    /// Empty fake cluster.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeClusterState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Script the lifecycle pacing of workloads whose name starts with
    /// `prefix`. First matching prefix wins.
    pub fn behavior_for(&self, prefix: &str, behavior: WorkloadBehavior) {
        self.state()
            .behaviors
            .push((prefix.to_string(), behavior));
    }

    /// Seed an already running workload, e.g. a control-plane component.
    pub fn seed_running(&self, namespace: &str, name: &str, node: &str, role: &str) {
        let mut labels = BTreeMap::new();
        labels.insert(ROLE_LABEL.to_string(), role.to_string());
        let mut state = self.state();
        state.created += 1;
        let address = format!("10.244.0.{}", 10 + state.created);
        state.workloads.insert(
            (namespace.to_string(), name.to_string()),
            FakeWorkload {
                node: Some(node.to_string()),
                labels,
                behavior: WorkloadBehavior {
                    polls_until_running: 0,
                    polls_until_terminal: 0,
                    polls_until_address: 0,
                    terminal: TerminalBehavior::RunForever,
                },
                polls_seen: 1,
                address,
            },
        );
    }

    /// Script a node annotation value.
    pub fn set_node_annotation(&self, node: &str, key: &str, value: &str) {
        self.state()
            .node_annotations
            .insert((node.to_string(), key.to_string()), value.to_string());
    }

    /// Script the output of exec commands whose rendering contains `needle`.
    pub fn script_exec(&self, needle: &str, output: &str) {
        self.state()
            .exec_responses
            .push((needle.to_string(), output.to_string()));
    }

    /// Make exec commands whose rendering contains `needle` fail.
    pub fn fail_exec_containing(&self, needle: &str) {
        self.state().exec_failures.push(needle.to_string());
    }

    /// Script the logs returned for a workload.
    pub fn set_logs(&self, namespace: &str, name: &str, text: &str) {
        self.state()
            .logs
            .insert((namespace.to_string(), name.to_string()), text.to_string());
    }

    /// Make log fetches for `name` fail.
    pub fn fail_log_fetch(&self, name: &str) {
        self.state().fail_log_fetch_for.insert(name.to_string());
    }

    /// Make creation of the workload named `name` fail.
    pub fn fail_creation_of(&self, name: &str) {
        self.state().fail_creation_of.insert(name.to_string());
    }

    /// Make the next `count` workload gets fail transiently.
    pub fn fail_next_gets(&self, count: u32) {
        self.state().transient_get_failures = count;
    }

    /// Deletions issued so far as (namespace, name, graceful).
    pub fn deletions(&self) -> Vec<(String, String, bool)> {
        self.state().deletions.clone()
    }

    /// Current value of a namespace annotation key.
    pub fn annotation(&self, namespace: &str, key: &str) -> Option<String> {
        self.state()
            .annotations
            .get(namespace)
            .and_then(|keys| keys.get(key).cloned())
    }

    /// Exec invocations recorded so far as (workload, rendered command).
    pub fn exec_log(&self) -> Vec<(String, String)> {
        self.state().exec_log.clone()
    }

    /// Whether a workload currently exists.
    pub fn has_workload(&self, namespace: &str, name: &str) -> bool {
        self.state()
            .workloads
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    /// Names of the workloads currently present in `namespace`.
    pub fn workload_names(&self, namespace: &str) -> Vec<String> {
        self.state()
            .workloads
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn create_workload(&self, namespace: &str, spec: &WorkloadSpec) -> HarnessResult<()> {
        let mut state = self.state();
        if state.fail_creation_of.contains(&spec.name) {
            return Err(HarnessError::ExternalCommand {
                command: format!("create workload {}", spec.name),
                reason: "scripted creation failure".to_string(),
            });
        }
        let key = (namespace.to_string(), spec.name.clone());
        if state.workloads.contains_key(&key) {
            return Err(HarnessError::ExternalCommand {
                command: format!("create workload {}", spec.name),
                reason: "already exists".to_string(),
            });
        }
        let behavior = state
            .behaviors
            .iter()
            .find(|(prefix, _)| spec.name.starts_with(prefix))
            .map(|(_, behavior)| behavior.clone())
            .unwrap_or_default();
        state.created += 1;
        let address = format!("10.244.0.{}", 10 + state.created);
        let node = spec
            .node
            .clone()
            .or_else(|| Some(DEFAULT_NODE.to_string()));
        state.workloads.insert(
            key,
            FakeWorkload {
                node,
                labels: spec.labels.clone(),
                behavior,
                polls_seen: 0,
                address,
            },
        );
        Ok(())
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> HarnessResult<Workload> {
        let mut state = self.state();
        if state.transient_get_failures > 0 {
            state.transient_get_failures -= 1;
            return Err(HarnessError::ExternalCommand {
                command: format!("get workload {name}"),
                reason: "scripted transient failure".to_string(),
            });
        }
        let key = (namespace.to_string(), name.to_string());
        let workload = state
            .workloads
            .get_mut(&key)
            .ok_or_else(|| HarnessError::ExternalCommand {
                command: format!("get workload {name}"),
                reason: "not found".to_string(),
            })?;
        workload.polls_seen += 1;
        Ok(workload.observed(name))
    }

    async fn list_workloads(
        &self,
        namespace: &str,
        role: Option<&str>,
        node: Option<&str>,
    ) -> HarnessResult<Vec<Workload>> {
        let state = self.state();
        Ok(state
            .workloads
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .filter(|(_, workload)| {
                role.is_none_or(|role| {
                    workload.labels.get(ROLE_LABEL).map(String::as_str) == Some(role)
                })
            })
            .filter(|(_, workload)| node.is_none_or(|node| workload.node.as_deref() == Some(node)))
            .map(|((_, name), workload)| workload.observed(name))
            .collect())
    }

    async fn delete_workload(
        &self,
        namespace: &str,
        name: &str,
        graceful: bool,
    ) -> HarnessResult<()> {
        let mut state = self.state();
        let key = (namespace.to_string(), name.to_string());
        if state.workloads.remove(&key).is_none() {
            return Err(HarnessError::ExternalCommand {
                command: format!("delete workload {name}"),
                reason: "not found".to_string(),
            });
        }
        state
            .deletions
            .push((namespace.to_string(), name.to_string(), graceful));
        Ok(())
    }

    async fn annotate_namespace(
        &self,
        namespace: &str,
        annotations: &[(String, String)],
        overwrite: bool,
    ) -> HarnessResult<()> {
        let mut state = self.state();
        let keys = state
            .annotations
            .entry(namespace.to_string())
            .or_default();
        for (key, value) in annotations {
            if !overwrite && keys.contains_key(key) {
                return Err(HarnessError::ExternalCommand {
                    command: format!("annotate namespace {namespace}"),
                    reason: format!("{key} already has a value, overwrite not requested"),
                });
            }
            keys.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn exec_in_workload(
        &self,
        namespace: &str,
        name: &str,
        _container: &str,
        command: &[String],
    ) -> HarnessResult<String> {
        let mut state = self.state();
        let key = (namespace.to_string(), name.to_string());
        if !state.workloads.contains_key(&key) {
            return Err(HarnessError::ExternalCommand {
                command: format!("exec in {name}"),
                reason: "not found".to_string(),
            });
        }
        let rendered = command.join(" ");
        state.exec_log.push((name.to_string(), rendered.clone()));
        if let Some(needle) = state
            .exec_failures
            .iter()
            .find(|needle| rendered.contains(needle.as_str()))
        {
            return Err(HarnessError::ExternalCommand {
                command: format!("exec in {name}: {rendered}"),
                reason: format!("scripted failure ({needle})"),
            });
        }
        Ok(state
            .exec_responses
            .iter()
            .find(|(needle, _)| rendered.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }

    async fn workload_logs(
        &self,
        namespace: &str,
        name: &str,
        _container: &str,
    ) -> HarnessResult<String> {
        let state = self.state();
        if state.fail_log_fetch_for.contains(name) {
            return Err(HarnessError::ExternalCommand {
                command: format!("logs {name}"),
                reason: "scripted log fetch failure".to_string(),
            });
        }
        Ok(state
            .logs
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn node_annotation(&self, node: &str, key: &str) -> HarnessResult<String> {
        self.state()
            .node_annotations
            .get(&(node.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| HarnessError::ExternalCommand {
                command: format!("get node {node}"),
                reason: format!("annotation {key} not present"),
            })
    }
}
