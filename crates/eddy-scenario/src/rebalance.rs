//! Topology-change scenarios: add, remove or fail over members while the
//! workload runs, then verify the index caught up.

use eddy_cluster::Membership;
use eddy_types::{LivenessRole, ScenarioDefinition, ScenarioKind};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::info;

use crate::error::ScenarioError;
use crate::executor::{Deployment, RunOutcome, ScenarioEnv, ScenarioExecutor, ScenarioState};
use crate::perturbation::{Perturbation, PerturbationDriver};
use crate::workload::WorkloadGenerator;

/// Runs the workload concurrently with one topology mutation.
///
/// The mutated members are the last `add_count` / `remove_count` /
/// `failover_count` non-entry primaries. Members to be added are held back
/// from the initial topology; members to be removed stay `Active` until the
/// cluster acknowledges their eject or failover.
pub struct RebalanceExecutor {
    deployment: Deployment,
    perturbation: Perturbation,
}

impl RebalanceExecutor {
    pub fn new(env: ScenarioEnv) -> Result<Self, ScenarioError> {
        let kind = env.definition.kind;
        let mut deployment = Deployment::new(env)?;
        let definition = deployment.definition();
        let needed = match kind {
            ScenarioKind::AddRebalance => definition.add_count,
            ScenarioKind::RemoveRebalance => definition.remove_count,
            ScenarioKind::FailoverRebalance => definition.failover_count,
            ScenarioKind::Passthrough => 0,
        };

        let candidates = deployment.non_entry_members();
        if needed > candidates.len() {
            return Err(ScenarioError::NotEnoughMembers {
                kind,
                role: "non-entry primary",
                needed,
                available: candidates.len(),
            });
        }
        let chosen = candidates[candidates.len() - needed..].to_vec();

        let perturbation = match kind {
            ScenarioKind::AddRebalance => {
                for member in &chosen {
                    deployment.set_role(&member.id, LivenessRole::PendingAdd);
                }
                Perturbation::Add(
                    chosen
                        .into_iter()
                        .map(|m| m.with_role(LivenessRole::PendingAdd))
                        .collect(),
                )
            }
            ScenarioKind::RemoveRebalance | ScenarioKind::FailoverRebalance => {
                let ids: Vec<_> = chosen.into_iter().map(|m| m.id).collect();
                if kind == ScenarioKind::RemoveRebalance {
                    Perturbation::Remove(ids)
                } else {
                    Perturbation::Failover(ids)
                }
            }
            ScenarioKind::Passthrough => Perturbation::None,
        };

        Ok(Self {
            deployment,
            perturbation,
        })
    }

    /// Boxed constructor for the scenario registry.
    pub fn boxed(env: ScenarioEnv) -> Result<Box<dyn ScenarioExecutor>, ScenarioError> {
        Ok(Box::new(Self::new(env)?))
    }

    pub fn perturbation(&self) -> &Perturbation {
        &self.perturbation
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    /// Move the mutated members to the role the cluster acknowledged.
    fn settle_roles(&mut self, membership: &Membership, rebalanced: bool) {
        match &self.perturbation {
            Perturbation::Add(members) if rebalanced => {
                for member in members {
                    self.deployment.set_role(&member.id, LivenessRole::Active);
                }
            }
            Perturbation::Remove(ids) | Perturbation::Failover(ids) => {
                for id in ids {
                    if membership.is_ejecting(id) {
                        self.deployment.set_role(id, LivenessRole::PendingEject);
                    } else if !membership.is_known(id) {
                        self.deployment.set_role(id, LivenessRole::Removed);
                    }
                }
            }
            _ => {}
        }
    }

    async fn run_inner(&mut self) -> Result<RunOutcome, ScenarioError> {
        let started = Instant::now();
        self.deployment.start_replication().await;

        let pair = self.deployment.workload_pair()?;
        let timing = *self.deployment.timing();
        let cluster = self.deployment.take_cluster()?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let workload = WorkloadGenerator::new(
            self.deployment.primary_entry().clone(),
            pair.source.clone(),
            self.deployment.definition().workload,
            timing.workload_grace,
        )
        .start(stop_rx);
        let driver = PerturbationDriver::start(
            cluster,
            self.perturbation.clone(),
            timing.perturbation_settle,
            stop_tx,
        );

        let count = workload.join().await;
        let outcome = driver.join().await?;
        self.settle_roles(outcome.cluster.membership(), outcome.result.is_ok());
        self.deployment.restore_cluster(outcome.cluster);

        let acknowledged = count?;
        if let Err(source) = outcome.result {
            return Err(ScenarioError::Perturbation {
                acknowledged,
                source,
            });
        }

        info!(acknowledged, target = %pair.target, "verifying convergence");
        let convergence = self.deployment.verify(&pair, acknowledged).await;
        Ok(RunOutcome {
            elapsed: started.elapsed(),
            convergence,
        })
    }
}

#[async_trait::async_trait]
impl ScenarioExecutor for RebalanceExecutor {
    fn kind(&self) -> ScenarioKind {
        self.deployment.kind()
    }

    fn definition(&self) -> &ScenarioDefinition {
        self.deployment.definition()
    }

    fn state(&self) -> ScenarioState {
        self.deployment.state()
    }

    async fn setup(&mut self) -> Result<(), ScenarioError> {
        self.deployment.provision().await
    }

    async fn run(&mut self) -> Result<RunOutcome, ScenarioError> {
        self.deployment.begin_run()?;
        let result = self.run_inner().await;
        self.deployment.finish_run(result.is_ok());
        result
    }

    async fn teardown(&mut self) -> Result<(), ScenarioError> {
        self.deployment.teardown().await
    }
}
