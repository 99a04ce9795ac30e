//! Error types for scenario execution.

use eddy_cluster::ClusterError;
use eddy_types::ScenarioKind;

use crate::executor::ScenarioState;

/// Errors that end a scenario phase.
///
/// The variants follow the phase that produced them so the runner can map an
/// error straight to a verdict. Count-read failures never show up here: the
/// verifier turns them into a non-converged result instead.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// A setup call against either cluster failed.
    #[error("provisioning failed: {0}")]
    Provisioning(#[source] ClusterError),

    /// A workload write failed.
    #[error("workload write failed after {acknowledged} acknowledged writes: {source}")]
    Workload {
        /// Writes acknowledged before the failure.
        acknowledged: u64,
        #[source]
        source: ClusterError,
    },

    /// The topology mutation was refused. The workload still ran to its stop
    /// signal; `acknowledged` is its final count.
    #[error("perturbation failed after {acknowledged} acknowledged writes: {source}")]
    Perturbation {
        acknowledged: u64,
        #[source]
        source: ClusterError,
    },

    /// A cleanup call failed.
    #[error("teardown failed: {0}")]
    Teardown(#[source] ClusterError),

    /// The deployment lacks members the scenario needs.
    #[error("{kind} needs {needed} {role} members, {available} configured")]
    NotEnoughMembers {
        kind: ScenarioKind,
        role: &'static str,
        needed: usize,
        available: usize,
    },

    /// The scenario defines no replication slot.
    #[error("{0} needs at least one replication slot")]
    NoReplicationSlots(ScenarioKind),

    /// The scenario writes a fixed batch but no item count was configured.
    #[error("{0} needs a workload item count")]
    UnboundedWorkload(ScenarioKind),

    /// A phase was invoked out of order.
    #[error("cannot {op} from state {state:?}")]
    InvalidState {
        op: &'static str,
        state: ScenarioState,
    },

    /// A spawned task panicked or was cancelled.
    #[error("{task} task failed: {reason}")]
    Task { task: &'static str, reason: String },

    /// No factory is registered for the requested kind.
    #[error("no scenario registered for {0}")]
    Unregistered(ScenarioKind),
}

impl ScenarioError {
    /// Final workload count carried by a run-phase error, if the workload got
    /// that far.
    pub fn acknowledged(&self) -> Option<u64> {
        match self {
            ScenarioError::Workload { acknowledged, .. }
            | ScenarioError::Perturbation { acknowledged, .. } => Some(*acknowledged),
            _ => None,
        }
    }
}
