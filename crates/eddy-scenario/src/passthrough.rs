//! Passthrough scenario: load a fixed batch, then start replication and
//! verify that every item arrives. No topology change.

use eddy_types::{ScenarioDefinition, ScenarioKind};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::info;

use crate::error::ScenarioError;
use crate::executor::{Deployment, RunOutcome, ScenarioEnv, ScenarioExecutor, ScenarioState};
use crate::workload::WorkloadGenerator;

pub struct PassthroughExecutor {
    deployment: Deployment,
}

impl PassthroughExecutor {
    /// Requires a workload item count: the batch is written before
    /// replication starts and nothing else stops the generator.
    pub fn new(env: ScenarioEnv) -> Result<Self, ScenarioError> {
        if env.definition.workload.item_count.is_none() {
            return Err(ScenarioError::UnboundedWorkload(env.definition.kind));
        }
        Ok(Self {
            deployment: Deployment::new(env)?,
        })
    }

    pub fn boxed(env: ScenarioEnv) -> Result<Box<dyn ScenarioExecutor>, ScenarioError> {
        Ok(Box::new(Self::new(env)?))
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    async fn run_inner(&mut self) -> Result<RunOutcome, ScenarioError> {
        let started = Instant::now();
        let pair = self.deployment.workload_pair()?;

        // Held until the batch is written so only the item count ends it.
        let (stop_tx, stop_rx) = oneshot::channel();
        let acknowledged = WorkloadGenerator::new(
            self.deployment.primary_entry().clone(),
            pair.source.clone(),
            self.deployment.definition().workload,
            self.deployment.timing().workload_grace,
        )
        .start(stop_rx)
        .join()
        .await?;
        drop(stop_tx);
        info!(acknowledged, source = %pair.source, "batch written");

        self.deployment.start_replication().await;

        let convergence = self.deployment.verify(&pair, acknowledged).await;
        Ok(RunOutcome {
            elapsed: started.elapsed(),
            convergence,
        })
    }
}

#[async_trait::async_trait]
impl ScenarioExecutor for PassthroughExecutor {
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
