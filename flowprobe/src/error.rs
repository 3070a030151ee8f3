//! Error types for harness operations.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while orchestrating a verification scenario.
///
/// Every variant is fatal to the enclosing scenario except where a polling
/// loop explicitly swallows transient query failures up to its retry
/// budget. Variants carry the failing step, the target identifier, and the
/// underlying collaborator error text.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A workload or simulated host could not be created.
    #[error("failed to create {kind} `{name}`: {reason}")]
    ResourceCreation {
        /// What kind of resource failed to come up.
        kind: ResourceKind,
        /// Name the resource would have carried.
        name: String,
        /// Underlying collaborator error.
        reason: String,
    },

    /// A workload never left the pending phase within the retry budget.
    #[error("workload `{name}` still pending after {attempts} attempts")]
    SchedulingTimeout {
        /// Workload that never got scheduled.
        name: String,
        /// Attempts spent waiting.
        attempts: u32,
    },

    /// No valid address was observed within the retry budget.
    #[error("no valid address for workload `{name}` after {attempts} attempts")]
    AddressResolutionTimeout {
        /// Workload whose address never materialized.
        name: String,
        /// Attempts spent polling.
        attempts: u32,
    },

    /// The connectivity probe workload reached a failed terminal state.
    #[error("connectivity probe `{name}` failed: {reason}")]
    ProbeFailure {
        /// Probe workload name.
        name: String,
        /// Failure description, with diagnostic logs where retrievable.
        reason: String,
    },

    /// The probe task stopped without delivering the expected signal.
    #[error("probe `{name}` abandoned: {reason}")]
    ProbeAbandoned {
        /// Probe workload name.
        name: String,
        /// Why the rendezvous never completed.
        reason: String,
    },

    /// No running workload matched the fault-injection predicate.
    #[error("no running workload matched role `{role}` (node filter: {node:?})")]
    FaultTargetNotFound {
        /// Role label the predicate required.
        role: String,
        /// Node the predicate was scoped to, when set.
        node: Option<String>,
    },

    /// An external command returned non-zero or produced malformed output.
    #[error("command `{command}` failed: {reason}")]
    ExternalCommand {
        /// Rendered command line or query description.
        command: String,
        /// Exit status and combined output, or the parse failure.
        reason: String,
    },

    /// Traffic unexpectedly traversed a path that must stay cold.
    #[error("unexpected traffic toward {target}: {flow}")]
    UnexpectedTraffic {
        /// Address the cold path pointed at.
        target: String,
        /// Offending flow-table entry.
        flow: String,
    },

    /// Neither candidate node set matched during topology discovery.
    #[error("no `{role}` workload found on any known node set")]
    TopologyNotDiscovered {
        /// Role label probed for during discovery.
        role: String,
    },

    /// The environment failed the internet-egress preflight check.
    #[error("egress preflight against {url} failed: {reason}")]
    EgressUnavailable {
        /// URL the preflight fetched.
        url: String,
        /// HTTP status or transport error.
        reason: String,
    },

    /// A component was driven through an illegal state transition.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// One or more teardown steps failed after the scenario body finished.
    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

/// A type alias for `Result<T, HarnessError>`.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// The kind of external resource that failed to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A workload in the scenario namespace.
    Workload,
    /// A host process created through the host runtime.
    Host,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Workload => write!(f, "workload"),
            ResourceKind::Host => write!(f, "host"),
        }
    }
}

/// Accumulated failures from scenario teardown.
///
/// Teardown never short-circuits: every cleanup step runs and its failures
/// collect here, so one failed removal cannot leak the remaining hosts.
#[derive(Debug)]
pub struct TeardownError {
    /// Failed cleanup steps as (resource name, underlying error) pairs.
    pub failures: Vec<(String, HarnessError)>,
}

impl fmt::Display for TeardownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} teardown step(s) failed:", self.failures.len())?;
        for (name, err) in &self.failures {
            write!(f, " [{name}: {err}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for TeardownError {}
