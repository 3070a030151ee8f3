//! Background connectivity probing with an ordered two-signal rendezvous.
//!
//! A probe runs as an independent spawned task. It publishes two signals
//! in order on one bounded channel: `TargetObservable` once the probe
//! workload is alive on a known node, then exactly one `Finished` carrying
//! the terminal verdict. The orchestrator injects faults only between the
//! two signals, and asserts only after the second.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterApi, Workload, WorkloadSpec, container_name};
use crate::config::ProbeConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::lifecycle::{LifecycleOutcome, LifecycleWaiter};
use crate::time::TimeProvider;

/// Terminal verdict of a connectivity probe.
///
/// Exactly one is produced per probe invocation and delivered exactly once
/// over the probe's signal channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeResult {
    /// Whether every reachability attempt succeeded.
    pub success: bool,
    /// Failure description when `success` is false, with diagnostic logs
    /// where retrievable.
    pub error: Option<String>,
}

impl ProbeResult {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }
}

/// Reachability target probed from inside a workload.
#[derive(Clone, Debug)]
pub enum ProbeTarget {
    /// Bounded TCP connect attempts against a (host, port) pair.
    Tcp {
        /// Host the workload connects to.
        host: String,
        /// TCP port the workload connects to.
        port: u16,
    },
    /// Bounded ICMP echo attempts against a host.
    Icmp {
        /// Host the workload pings.
        host: String,
    },
}

impl ProbeTarget {
    /// In-workload script performing the bounded reachability check.
    ///
    /// The script exits zero only if every attempt succeeded, so the
    /// workload's terminal phase is the probe verdict.
    fn script(&self, config: &ProbeConfig) -> String {
        match self {
            ProbeTarget::Tcp { host, port } => {
                let timeout = config.attempt_timeout.as_secs().max(1);
                let delay = config.attempt_delay.as_secs().max(1);
                format!(
                    "set -xe; for i in $(seq 1 {}); do nc -vz -w {timeout} {host} {port}; sleep {delay}; done",
                    config.attempts
                )
            }
            ProbeTarget::Icmp { host } => {
                let warmup = config.icmp_warmup.as_secs();
                let deadline = config.attempt_timeout.as_secs().max(1);
                // -W bounds each reply wait, -w bounds the whole run
                format!(
                    "sleep {warmup}; ping -c {} -W 2 -w {deadline} {host}",
                    config.icmp_count
                )
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            ProbeTarget::Tcp { host, port } => format!("{host}:{port}"),
            ProbeTarget::Icmp { host } => host.clone(),
        }
    }
}

/// Ordered signals published by a probe task.
#[derive(Debug)]
pub enum ProbeSignal {
    /// The probe workload is scheduled and observable.
    TargetObservable(Workload),
    /// The probe reached its terminal state.
    Finished(ProbeResult),
}

/// Handle to a spawned probe task.
///
/// Receives the probe's ordered signals under a hard deadline derived from
/// the probe's attempt schedule: a silent probe is abandoned, never
/// awaited forever.
pub struct ProbeHandle<T> {
    name: String,
    rx: mpsc::Receiver<ProbeSignal>,
    time: T,
    deadline: Duration,
    pending_result: Option<ProbeResult>,
}

impl<T: TimeProvider> ProbeHandle<T> {
    /// Name of the probe workload this handle supervises.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the probe workload to become observable.
    ///
    /// A probe that reaches its terminal state before its target was ever
    /// observable surfaces that failure here; the terminal result stays
    /// buffered for a later [`verdict`](Self::verdict) call.
    pub async fn target_observable(&mut self) -> HarnessResult<Workload> {
        match self.recv_bounded().await? {
            ProbeSignal::TargetObservable(workload) => Ok(workload),
            ProbeSignal::Finished(result) => {
                let reason = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "probe finished before its target became observable".to_string());
                self.pending_result = Some(result);
                Err(HarnessError::ProbeFailure {
                    name: self.name.clone(),
                    reason,
                })
            }
        }
    }

    /// Wait for the probe's terminal verdict.
    pub async fn verdict(mut self) -> HarnessResult<ProbeResult> {
        if let Some(result) = self.pending_result.take() {
            return Ok(result);
        }
        loop {
            match self.recv_bounded().await? {
                ProbeSignal::Finished(result) => return Ok(result),
                // Skip the observable signal when the caller never waited
                // on it.
                ProbeSignal::TargetObservable(_) => continue,
            }
        }
    }

    async fn recv_bounded(&mut self) -> HarnessResult<ProbeSignal> {
        let deadline = self.deadline;
        match self.time.timeout(deadline, self.rx.recv()).await {
            Ok(Some(signal)) => Ok(signal),
            Ok(None) => Err(HarnessError::ProbeAbandoned {
                name: self.name.clone(),
                reason: "probe task exited without signalling".to_string(),
            }),
            Err(()) => Err(HarnessError::ProbeAbandoned {
                name: self.name.clone(),
                reason: format!("no signal within {deadline:?}"),
            }),
        }
    }
}

/// Spawns and supervises connectivity probe workloads.
#[derive(Clone, Debug)]
pub struct ConnectivityProbe<C, T> {
    cluster: C,
    time: T,
    config: ProbeConfig,
}

impl<C: ClusterApi, T: TimeProvider> ConnectivityProbe<C, T> {
    /// Prober over the given collaborators.
    pub fn new(cluster: C, time: T, config: ProbeConfig) -> Self {
        Self {
            cluster,
            time,
            config,
        }
    }

    /// Spawn a probe workload named `name` against `target`, pinned to
    /// `node` when given.
    ///
    /// Returns immediately; the spawned task creates the workload and
    /// publishes its two signals in order. Cancelling `cancel` stops the
    /// task during teardown without a terminal signal.
    pub fn spawn(
        &self,
        namespace: &str,
        name: &str,
        node: Option<&str>,
        target: ProbeTarget,
        cancel: CancellationToken,
    ) -> ProbeHandle<T> {
        let (tx, rx) = mpsc::channel(2);
        tracing::info!(
            "launching probe {name} against {} in namespace {namespace}",
            target.describe()
        );
        let worker = ProbeWorker {
            cluster: self.cluster.clone(),
            time: self.time.clone(),
            config: self.config.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            node: node.map(str::to_string),
            target,
        };
        let task_name = worker.name.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("probe {task_name} cancelled before completion");
                }
                () = worker.run(tx) => {}
            }
        });
        ProbeHandle {
            name: name.to_string(),
            rx,
            time: self.time.clone(),
            deadline: self.config.verdict_deadline(),
            pending_result: None,
        }
    }

    /// Run a probe to completion with no concurrent fault: spawn, wait
    /// for the target to be observable, then await the verdict.
    pub async fn run_to_completion(
        &self,
        namespace: &str,
        name: &str,
        node: Option<&str>,
        target: ProbeTarget,
    ) -> HarnessResult<ProbeResult> {
        let mut handle = self.spawn(namespace, name, node, target, CancellationToken::new());
        handle.target_observable().await?;
        handle.verdict().await
    }
}

struct ProbeWorker<C, T> {
    cluster: C,
    time: T,
    config: ProbeConfig,
    namespace: String,
    name: String,
    node: Option<String>,
    target: ProbeTarget,
}

impl<C: ClusterApi, T: TimeProvider> ProbeWorker<C, T> {
    async fn run(self, tx: mpsc::Sender<ProbeSignal>) {
        let container = container_name(&self.name);
        let script = self.target.script(&self.config);
        let spec = WorkloadSpec::shell(&self.name, self.node.as_deref(), &script);

        if let Err(err) = self.cluster.create_workload(&self.namespace, &spec).await {
            Self::send(
                &tx,
                ProbeSignal::Finished(ProbeResult::failed(format!(
                    "failed to create probe workload: {err}"
                ))),
            )
            .await;
            return;
        }

        let waiter = LifecycleWaiter::new(
            self.cluster.clone(),
            self.time.clone(),
            self.config.lifecycle_budget,
        );
        match waiter
            .wait_until_scheduled(&self.namespace, &self.name, &container)
            .await
        {
            LifecycleOutcome::ScheduledRunning | LifecycleOutcome::Succeeded => {}
            LifecycleOutcome::Failed { reason, logs } => {
                Self::send(
                    &tx,
                    ProbeSignal::Finished(ProbeResult::failed(combine_reason(reason, logs))),
                )
                .await;
                return;
            }
            LifecycleOutcome::TimedOut => {
                Self::send(
                    &tx,
                    ProbeSignal::Finished(ProbeResult::failed(
                        "probe workload never left pending".to_string(),
                    )),
                )
                .await;
                return;
            }
        }

        // Publish the observable descriptor so the orchestrator can line
        // up a fault against the probe's node before the verdict exists.
        match self.cluster.get_workload(&self.namespace, &self.name).await {
            Ok(workload) => {
                tracing::info!(
                    "probe workload {} running on {:?}",
                    self.name,
                    workload.node
                );
                Self::send(&tx, ProbeSignal::TargetObservable(workload)).await;
            }
            Err(err) => {
                Self::send(
                    &tx,
                    ProbeSignal::Finished(ProbeResult::failed(format!(
                        "probe workload not observable: {err}"
                    ))),
                )
                .await;
                return;
            }
        }

        let terminal_waiter = LifecycleWaiter::new(
            self.cluster.clone(),
            self.time.clone(),
            self.config.terminal_budget(),
        );
        let result = match terminal_waiter
            .wait_until_terminal(&self.namespace, &self.name, &container)
            .await
        {
            LifecycleOutcome::Succeeded => ProbeResult::ok(),
            LifecycleOutcome::Failed { reason, logs } => {
                ProbeResult::failed(combine_reason(reason, logs))
            }
            LifecycleOutcome::TimedOut => ProbeResult::failed(
                "probe workload never reached a terminal phase".to_string(),
            ),
            LifecycleOutcome::ScheduledRunning => ProbeResult::failed(
                "probe workload still running past its schedule".to_string(),
            ),
        };
        Self::send(&tx, ProbeSignal::Finished(result)).await;
    }

    async fn send(tx: &mpsc::Sender<ProbeSignal>, signal: ProbeSignal) {
        if tx.send(signal).await.is_err() {
            tracing::debug!("probe signal receiver dropped");
        }
    }
}

fn combine_reason(reason: String, logs: Option<String>) -> String {
    match logs {
        Some(logs) if !logs.is_empty() => format!("{reason}; logs: {logs}"),
        _ => reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::{FakeCluster, TerminalBehavior, WorkloadBehavior};
    use crate::time::TokioTimeProvider;

    fn prober(cluster: &FakeCluster) -> ConnectivityProbe<FakeCluster, TokioTimeProvider> {
        ConnectivityProbe::new(cluster.clone(), TokioTimeProvider::new(), ProbeConfig::fast())
    }

    fn tcp_target() -> ProbeTarget {
        ProbeTarget::Tcp {
            host: "8.8.8.8".to_string(),
            port: 53,
        }
    }

    #[test]
    fn tcp_script_is_bounded_and_strict() {
        let config = ProbeConfig::default();
        let script = tcp_target().script(&config);
        assert!(script.starts_with("set -xe"));
        assert!(script.contains("seq 1 10"));
        assert!(script.contains("nc -vz -w 30 8.8.8.8 53"));
        assert!(script.contains("sleep 2"));
    }

    #[test]
    fn icmp_script_carries_count_and_deadline() {
        let config = ProbeConfig::default();
        let script = ProbeTarget::Icmp {
            host: "10.249.0.1".to_string(),
        }
        .script(&config);
        assert!(script.contains("sleep 20"));
        assert!(script.contains("ping -c 3 -W 2 -w 30 10.249.0.1"));
    }

    #[tokio::test]
    async fn observable_signal_precedes_the_verdict() {
        let cluster = FakeCluster::new();
        cluster.behavior_for(
            "probe-steady",
            WorkloadBehavior {
                polls_until_running: 1,
                polls_until_terminal: 4,
                polls_until_address: 1,
                terminal: TerminalBehavior::Succeed,
            },
        );
        let mut handle = prober(&cluster).spawn(
            "ns",
            "probe-steady",
            None,
            tcp_target(),
            CancellationToken::new(),
        );

        let observed = handle.target_observable().await.expect("observable");
        assert_eq!(observed.name, "probe-steady");
        assert!(observed.node.is_some());

        let result = handle.verdict().await.expect("verdict");
        assert_eq!(result, ProbeResult::ok());
    }

    #[tokio::test]
    async fn setup_failure_surfaces_at_the_observable_rendezvous() {
        let cluster = FakeCluster::new();
        cluster.fail_creation_of("probe-steady");
        let mut handle = prober(&cluster).spawn(
            "ns",
            "probe-steady",
            None,
            tcp_target(),
            CancellationToken::new(),
        );

        let err = handle.target_observable().await.expect_err("must fail");
        match err {
            HarnessError::ProbeFailure { name, reason } => {
                assert_eq!(name, "probe-steady");
                assert!(reason.contains("failed to create probe workload"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn failed_probe_attaches_logs_to_the_result() {
        let cluster = FakeCluster::new();
        cluster.behavior_for(
            "probe-broken",
            WorkloadBehavior {
                polls_until_running: 1,
                polls_until_terminal: 2,
                polls_until_address: 1,
                terminal: TerminalBehavior::Fail("Error".to_string()),
            },
        );
        cluster.set_logs("ns", "probe-broken", "nc: connection timed out");

        let result = prober(&cluster)
            .run_to_completion("ns", "probe-broken", None, tcp_target())
            .await
            .expect("verdict delivered");
        assert!(!result.success);
        let error = result.error.expect("error present");
        assert!(error.contains("Error"));
        assert!(error.contains("nc: connection timed out"));
    }

    #[tokio::test]
    async fn fast_success_still_signals_in_order() {
        let cluster = FakeCluster::new();
        // Terminal before the observable descriptor was ever fetched.
        cluster.behavior_for(
            "probe-quick",
            WorkloadBehavior {
                polls_until_running: 0,
                polls_until_terminal: 0,
                polls_until_address: 0,
                terminal: TerminalBehavior::Succeed,
            },
        );
        let mut handle = prober(&cluster).spawn(
            "ns",
            "probe-quick",
            None,
            tcp_target(),
            CancellationToken::new(),
        );

        let observed = handle.target_observable().await.expect("observable");
        assert_eq!(observed.name, "probe-quick");
        let result = handle.verdict().await.expect("verdict");
        assert!(result.success);
    }
}
