//! Perturbation driver: one topology mutation, a settle wait, then the stop
//! signal for the workload.

use std::time::Duration;

use eddy_cluster::{ClusterError, PrimaryCluster, RebalanceStatus};
use eddy_types::{ClusterMember, MemberId};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::ScenarioError;

/// The topology mutation a scenario applies while the workload runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Perturbation {
    /// Leave the topology alone.
    None,
    /// Add the members, then rebalance them in.
    Add(Vec<ClusterMember>),
    /// Eject the members, then rebalance them out.
    Remove(Vec<MemberId>),
    /// Fail the members over, then rebalance them out.
    Failover(Vec<MemberId>),
}

impl Perturbation {
    pub fn name(&self) -> &'static str {
        match self {
            Perturbation::None => "none",
            Perturbation::Add(_) => "add",
            Perturbation::Remove(_) => "remove",
            Perturbation::Failover(_) => "failover",
        }
    }

    /// Number of members the mutation touches.
    pub fn len(&self) -> usize {
        match self {
            Perturbation::None => 0,
            Perturbation::Add(members) => members.len(),
            Perturbation::Remove(ids) | Perturbation::Failover(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply the mutation through `cluster`.
    pub async fn apply(&self, cluster: &mut PrimaryCluster) -> Result<(), ClusterError> {
        match self {
            Perturbation::None => Ok(()),
            Perturbation::Add(members) => cluster.add_and_rebalance(members).await,
            Perturbation::Remove(ids) => cluster.remove_and_rebalance(ids).await,
            Perturbation::Failover(ids) => cluster.failover_and_rebalance(ids).await,
        }
    }
}

/// What the driver hands back once it is done.
#[derive(Debug)]
pub struct PerturbationOutcome {
    /// The primary-cluster handle, moved back out of the task.
    pub cluster: PrimaryCluster,
    /// Result of the mutation itself.
    pub result: Result<(), ClusterError>,
    /// Rebalance status read after the settle wait, if the read succeeded.
    pub progress: Option<RebalanceStatus>,
}

pub struct PerturbationDriver;

impl PerturbationDriver {
    /// Spawn the driver.
    ///
    /// The stop signal fires after the settle wait whether or not the
    /// mutation succeeded; a failed mutation surfaces through
    /// [`PerturbationOutcome::result`].
    pub fn start(
        mut cluster: PrimaryCluster,
        perturbation: Perturbation,
        settle: Duration,
        stop: oneshot::Sender<()>,
    ) -> PerturbationHandle {
        PerturbationHandle(tokio::spawn(async move {
            info!(
                kind = perturbation.name(),
                members = perturbation.len(),
                "applying perturbation"
            );
            let result = perturbation.apply(&mut cluster).await;
            match &result {
                Ok(()) => info!(kind = perturbation.name(), "perturbation applied"),
                Err(e) => error!(kind = perturbation.name(), error = %e, "perturbation failed"),
            }

            tokio::time::sleep(settle).await;

            // The generator may already be gone; that is fine.
            let _ = stop.send(());

            let progress = if perturbation.is_empty() {
                None
            } else {
                match cluster.rebalance_progress().await {
                    Ok(status) => {
                        info!(status = ?status, "rebalance progress after settle");
                        Some(status)
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read rebalance progress");
                        None
                    }
                }
            };

            PerturbationOutcome {
                cluster,
                result,
                progress,
            }
        }))
    }
}

/// Join handle of a running driver.
pub struct PerturbationHandle(JoinHandle<PerturbationOutcome>);

impl PerturbationHandle {
    pub async fn join(self) -> Result<PerturbationOutcome, ScenarioError> {
        self.0.await.map_err(|e| ScenarioError::Task {
            task: "perturbation",
            reason: e.to_string(),
        })
    }
}
