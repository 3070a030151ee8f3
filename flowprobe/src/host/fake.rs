//! In-memory host runtime for harness self-tests.

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::traits::HostRuntime;
use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Default)]
struct FakeHostState {
    hosts: BTreeMap<String, IpAddr>,
    next_octet: u8,
    commands: Vec<(String, Vec<String>)>,
    removed: Vec<String>,
    responses: Vec<(String, String)>,
    fail_commands_containing: Vec<String>,
    fail_removal_of: BTreeSet<String>,
    fail_creation_of: BTreeSet<String>,
}

/// In-memory, scriptable `HostRuntime` that records every interaction.
///
/// Hosts get deterministic `172.18.0.x` addresses in creation order.
#[derive(Clone, Debug, Default)]
pub struct FakeHostRuntime {
    inner: Arc<Mutex<FakeHostState>>,
}

impl FakeHostRuntime {
    /// Empty fake runtime.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeHostState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an existing host (e.g. a cluster node) at a fixed address.
    pub fn seed_host(&self, name: &str, address: IpAddr) {
        self.state().hosts.insert(name.to_string(), address);
    }

    /// Script the output of in-host commands whose rendering contains
    /// `needle`.
    pub fn script_command(&self, needle: &str, output: &str) {
        self.state()
            .responses
            .push((needle.to_string(), output.to_string()));
    }

    /// Make in-host commands whose rendering contains `needle` fail.
    pub fn fail_commands_containing(&self, needle: &str) {
        self.state()
            .fail_commands_containing
            .push(needle.to_string());
    }

    /// Make removal of `name` fail.
    pub fn fail_removal_of(&self, name: &str) {
        self.state().fail_removal_of.insert(name.to_string());
    }

    /// Make creation of `name` fail.
    pub fn fail_creation_of(&self, name: &str) {
        self.state().fail_creation_of.insert(name.to_string());
    }

    /// Rendered commands run inside `name`, in order.
    pub fn commands_for(&self, name: &str) -> Vec<String> {
        self.state()
            .commands
            .iter()
            .filter(|(host, _)| host == name)
            .map(|(_, argv)| argv.join(" "))
            .collect()
    }

    /// Hosts removed so far, in removal order.
    pub fn removed_hosts(&self) -> Vec<String> {
        self.state().removed.clone()
    }

    /// Hosts currently live.
    pub fn live_hosts(&self) -> Vec<String> {
        self.state().hosts.keys().cloned().collect()
    }
}

#[async_trait]
impl HostRuntime for FakeHostRuntime {
    async fn create_host(&self, name: &str) -> HarnessResult<()> {
        let mut state = self.state();
        if state.fail_creation_of.contains(name) {
            return Err(HarnessError::ExternalCommand {
                command: format!("create host {name}"),
                reason: "scripted creation failure".to_string(),
            });
        }
        state.next_octet += 1;
        let address = IpAddr::V4(Ipv4Addr::new(172, 18, 0, 10 + state.next_octet));
        state.hosts.insert(name.to_string(), address);
        Ok(())
    }

    async fn host_address(&self, name: &str) -> HarnessResult<IpAddr> {
        self.state()
            .hosts
            .get(name)
            .copied()
            .ok_or_else(|| HarnessError::ExternalCommand {
                command: format!("inspect host {name}"),
                reason: "no such host".to_string(),
            })
    }

    async fn run_in_host(&self, name: &str, command: &[String]) -> HarnessResult<String> {
        let mut state = self.state();
        if !state.hosts.contains_key(name) {
            return Err(HarnessError::ExternalCommand {
                command: format!("exec in host {name}"),
                reason: "no such host".to_string(),
            });
        }
        let rendered = command.join(" ");
        state
            .commands
            .push((name.to_string(), command.to_vec()));
        if let Some(needle) = state
            .fail_commands_containing
            .iter()
            .find(|needle| rendered.contains(needle.as_str()))
        {
            return Err(HarnessError::ExternalCommand {
                command: format!("exec in host {name}: {rendered}"),
                reason: format!("scripted failure ({needle})"),
            });
        }
        Ok(state
            .responses
            .iter()
            .find(|(needle, _)| rendered.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }

    async fn remove_host(&self, name: &str) -> HarnessResult<()> {
        let mut state = self.state();
        if state.fail_removal_of.contains(name) {
            return Err(HarnessError::ExternalCommand {
                command: format!("remove host {name}"),
                reason: "scripted removal failure".to_string(),
            });
        }
        state.hosts.remove(name);
        state.removed.push(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hosts_get_deterministic_addresses() {
        let runtime = FakeHostRuntime::new();
        runtime.create_host("gw-sim-a").await.expect("create");
        runtime.create_host("gw-sim-b").await.expect("create");

        let first = runtime.host_address("gw-sim-a").await.expect("address");
        let second = runtime.host_address("gw-sim-b").await.expect("address");
        assert_eq!(first.to_string(), "172.18.0.11");
        assert_eq!(second.to_string(), "172.18.0.12");
    }

    #[tokio::test]
    async fn commands_are_recorded_per_host() {
        let runtime = FakeHostRuntime::new();
        runtime.create_host("gw-sim-a").await.expect("create");
        runtime
            .run_in_host(
                "gw-sim-a",
                &["ip".to_string(), "link".to_string(), "show".to_string()],
            )
            .await
            .expect("run");

        assert_eq!(runtime.commands_for("gw-sim-a"), vec!["ip link show"]);
        assert!(runtime.commands_for("gw-sim-b").is_empty());
    }

    #[tokio::test]
    async fn removal_failures_leave_the_host_live() {
        let runtime = FakeHostRuntime::new();
        runtime.create_host("gw-sim-a").await.expect("create");
        runtime.fail_removal_of("gw-sim-a");

        assert!(runtime.remove_host("gw-sim-a").await.is_err());
        assert_eq!(runtime.live_hosts(), vec!["gw-sim-a"]);
    }
}
