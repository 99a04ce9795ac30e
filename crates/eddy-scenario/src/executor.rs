//! The three-phase scenario contract and the deployment state every scenario
//! kind drives through it.
//!
//! A [`ScenarioExecutor`] walks `Unconfigured → Provisioned → Running →
//! Verified → TornDown`. Any phase error moves it to `Failed`; teardown is
//! allowed from every state but `TornDown`.
//!
//! [`Deployment`] holds what all kinds share: the member handles, the
//! primary-cluster handle, the replication topology map, and the setup and
//! teardown sequences. Scenario kinds differ only in which members they hold
//! back and in how their run phase orders workload, perturbation and
//! replication.

use std::sync::Arc;
use std::time::Duration;

use eddy_cluster::{IndexNode, PrimaryCluster, PrimaryNode, remote_target};
use eddy_types::{
    ClusterMember, CollectionPair, ConvergenceResult, LivenessRole, MemberId, ReplicationBinding,
    ScenarioDefinition, ScenarioKind,
};
use tracing::{debug, info, warn};

use crate::error::ScenarioError;
use crate::timing::Timing;
use crate::topology::ReplicationTopology;
use crate::verifier::ConvergenceVerifier;

/// Lifecycle state of one scenario executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioState {
    Unconfigured,
    Provisioned,
    Running,
    Verified,
    TornDown,
    Failed,
}

/// Result of a completed run phase.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Time from the start of the run phase to the end of verification.
    pub elapsed: Duration,
    pub convergence: ConvergenceResult,
}

/// One interchangeable scenario strategy.
#[async_trait::async_trait]
pub trait ScenarioExecutor: Send {
    fn kind(&self) -> ScenarioKind;

    fn definition(&self) -> &ScenarioDefinition;

    fn state(&self) -> ScenarioState;

    /// Provision both clusters and the replication topology. Fail-fast.
    async fn setup(&mut self) -> Result<(), ScenarioError>;

    /// Run workload and perturbation, then verify convergence.
    async fn run(&mut self) -> Result<RunOutcome, ScenarioError>;

    /// Drain the topology map, reverse the topology, stop services.
    async fn teardown(&mut self) -> Result<(), ScenarioError>;
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything a scenario factory needs to build an executor.
pub struct ScenarioEnv {
    pub definition: ScenarioDefinition,
    /// Primary-cluster member handles; the first is the entry point.
    pub primaries: Vec<Arc<dyn PrimaryNode>>,
    /// Index-cluster member handles; the first is the entry point.
    pub indexes: Vec<Arc<dyn IndexNode>>,
    pub timing: Timing,
    /// Start every member's service before setup and stop index services on
    /// teardown. Primary services are always stopped on teardown.
    pub manage_services: bool,
}

impl ScenarioEnv {
    pub fn new(
        definition: ScenarioDefinition,
        primaries: Vec<Arc<dyn PrimaryNode>>,
        indexes: Vec<Arc<dyn IndexNode>>,
    ) -> Self {
        Self {
            definition,
            primaries,
            indexes,
            timing: Timing::default(),
            manage_services: false,
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_managed_services(mut self, manage: bool) -> Self {
        self.manage_services = manage;
        self
    }
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// Shared state and phases of a scenario run.
pub struct Deployment {
    definition: ScenarioDefinition,
    primaries: Vec<Arc<dyn PrimaryNode>>,
    indexes: Vec<Arc<dyn IndexNode>>,
    primary_entry: Arc<dyn PrimaryNode>,
    index_entry: Arc<dyn IndexNode>,
    /// Primary members and their liveness roles for this run.
    roster: Vec<ClusterMember>,
    timing: Timing,
    manage_services: bool,
    /// `None` while the perturbation driver owns it.
    cluster: Option<PrimaryCluster>,
    topology: ReplicationTopology,
    /// Remote reference created by this run, deleted at teardown.
    remote: Option<String>,
    state: ScenarioState,
}

impl Deployment {
    pub fn new(env: ScenarioEnv) -> Result<Self, ScenarioError> {
        let kind = env.definition.kind;
        let Some(primary_entry) = env.primaries.first().cloned() else {
            return Err(ScenarioError::NotEnoughMembers {
                kind,
                role: "primary",
                needed: 1,
                available: 0,
            });
        };
        let Some(index_entry) = env.indexes.first().cloned() else {
            return Err(ScenarioError::NotEnoughMembers {
                kind,
                role: "index",
                needed: 1,
                available: 0,
            });
        };
        if env.definition.replications.is_empty() {
            return Err(ScenarioError::NoReplicationSlots(kind));
        }

        let roster = env.primaries.iter().map(|n| n.member().clone()).collect();
        let cluster = PrimaryCluster::new(primary_entry.clone());

        Ok(Self {
            definition: env.definition,
            primaries: env.primaries,
            indexes: env.indexes,
            primary_entry,
            index_entry,
            roster,
            timing: env.timing,
            manage_services: env.manage_services,
            cluster: Some(cluster),
            topology: ReplicationTopology::new(),
            remote: None,
            state: ScenarioState::Unconfigured,
        })
    }

    pub fn definition(&self) -> &ScenarioDefinition {
        &self.definition
    }

    pub fn kind(&self) -> ScenarioKind {
        self.definition.kind
    }

    pub fn state(&self) -> ScenarioState {
        self.state
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn topology(&self) -> &ReplicationTopology {
        &self.topology
    }

    pub fn primary_entry(&self) -> &Arc<dyn PrimaryNode> {
        &self.primary_entry
    }

    /// The primary-cluster handle, unless a run currently holds it.
    pub fn cluster(&self) -> Option<&PrimaryCluster> {
        self.cluster.as_ref()
    }

    pub fn roster(&self) -> &[ClusterMember] {
        &self.roster
    }

    /// Primary members other than the entry point, in configuration order.
    pub fn non_entry_members(&self) -> Vec<ClusterMember> {
        self.roster
            .iter()
            .filter(|m| m.id != self.primary_entry.member().id)
            .cloned()
            .collect()
    }

    pub fn set_role(&mut self, id: &MemberId, role: LivenessRole) {
        if let Some(member) = self.roster.iter_mut().find(|m| m.id == *id) {
            member.role = role;
        }
    }

    fn expect_state(&self, op: &'static str, expected: ScenarioState) -> Result<(), ScenarioError> {
        if self.state != expected {
            return Err(ScenarioError::InvalidState {
                op,
                state: self.state,
            });
        }
        Ok(())
    }

    // -- setup --------------------------------------------------------------

    /// Initialize members, apply the initial topology and provision every
    /// replication slot.
    pub async fn provision(&mut self) -> Result<(), ScenarioError> {
        self.expect_state("setup", ScenarioState::Unconfigured)?;
        match self.provision_inner().await {
            Ok(()) => {
                self.state = ScenarioState::Provisioned;
                info!(
                    scenario = %self.kind(),
                    pairs = self.topology.len(),
                    "setup complete"
                );
                Ok(())
            }
            Err(e) => {
                self.state = ScenarioState::Failed;
                Err(e)
            }
        }
    }

    async fn provision_inner(&mut self) -> Result<(), ScenarioError> {
        if self.manage_services {
            for node in &self.primaries {
                node.start_service().await.map_err(ScenarioError::Provisioning)?;
            }
            for node in &self.indexes {
                node.start_service().await.map_err(ScenarioError::Provisioning)?;
            }
        }

        for node in &self.primaries {
            node.init().await.map_err(ScenarioError::Provisioning)?;
            debug!(member = %node.member().id, "primary member initialized");
        }
        for node in &self.indexes {
            node.init().await.map_err(ScenarioError::Provisioning)?;
            debug!(member = %node.member().id, "index member initialized");
        }
        info!(
            primary = %self.primary_entry.member().id,
            index = %self.index_entry.member().id,
            "entry points selected"
        );

        let initial: Vec<ClusterMember> = self
            .non_entry_members()
            .into_iter()
            .filter(|m| m.role != LivenessRole::PendingAdd)
            .collect();
        let Some(cluster) = self.cluster.as_mut() else {
            return Err(ScenarioError::InvalidState {
                op: "setup",
                state: self.state,
            });
        };
        cluster
            .add_and_rebalance(&initial)
            .await
            .map_err(ScenarioError::Provisioning)?;

        for (slot_no, slot) in self.definition.replications.iter().enumerate() {
            let pair = CollectionPair::for_slot(slot_no);
            self.primary_entry
                .create_collection(&pair.source, slot)
                .await
                .map_err(ScenarioError::Provisioning)?;
            tokio::time::sleep(self.timing.collection_settle).await;
            self.primary_entry
                .connect_collection(&pair.source)
                .await
                .map_err(ScenarioError::Provisioning)?;
            self.index_entry
                .create_index(&pair.target)
                .await
                .map_err(ScenarioError::Provisioning)?;
            info!(source = %pair.source, target = %pair.target, "replication pair provisioned");
            self.topology.register_pair(pair);
        }

        tokio::time::sleep(self.timing.setup_settle).await;
        Ok(())
    }

    // -- run ----------------------------------------------------------------

    /// Enter the run phase.
    pub fn begin_run(&mut self) -> Result<(), ScenarioError> {
        self.expect_state("run", ScenarioState::Provisioned)?;
        self.state = ScenarioState::Running;
        Ok(())
    }

    /// Leave the run phase: `Verified` if verification ran, `Failed` otherwise.
    pub fn finish_run(&mut self, verified: bool) {
        self.state = if verified {
            ScenarioState::Verified
        } else {
            ScenarioState::Failed
        };
    }

    /// The pair the workload writes to and the verifier reads.
    pub fn workload_pair(&self) -> Result<CollectionPair, ScenarioError> {
        self.topology
            .primary_pair()
            .cloned()
            .ok_or(ScenarioError::NoReplicationSlots(self.kind()))
    }

    /// Create the remote reference and one replication stream per pair.
    ///
    /// Best effort per pair: failures are logged and leave the pair inactive,
    /// which the verifier then reports as non-convergence. A refused remote
    /// reference does not skip the streams, since a reference left behind by
    /// an earlier run still serves them.
    pub async fn start_replication(&mut self) {
        let target = remote_target(self.index_entry.member());
        match self.primary_entry.create_remote_reference(&target).await {
            Ok(()) => self.remote = Some(target.name.clone()),
            Err(e) => {
                warn!(remote = %target.name, error = %e, "failed to create remote reference");
            }
        }

        let pairs = self.topology.pairs().to_vec();
        for pair in pairs {
            match self
                .primary_entry
                .create_replication_stream(&pair.source, &pair.target, &target.name)
                .await
            {
                Ok(()) => {
                    info!(source = %pair.source, target = %pair.target, "replication started");
                    self.topology.activate(ReplicationBinding {
                        source: pair.source,
                        target: pair.target,
                        remote: target.name.clone(),
                    });
                }
                Err(e) => {
                    warn!(source = %pair.source, error = %e, "failed to start replication");
                }
            }
        }
    }

    /// Lend the primary-cluster handle out for the run.
    pub fn take_cluster(&mut self) -> Result<PrimaryCluster, ScenarioError> {
        self.cluster.take().ok_or(ScenarioError::InvalidState {
            op: "run",
            state: self.state,
        })
    }

    pub fn restore_cluster(&mut self, cluster: PrimaryCluster) {
        self.cluster = Some(cluster);
    }

    /// Poll the target index of `pair` until it holds `expected` documents.
    pub async fn verify(&self, pair: &CollectionPair, expected: u64) -> ConvergenceResult {
        let verifier =
            ConvergenceVerifier::new(self.timing.verify_budget, self.timing.poll_interval);
        let index = self.index_entry.clone();
        let target = pair.target.clone();
        verifier
            .verify(expected, move || {
                let index = index.clone();
                let target = target.clone();
                async move { index.count(&target).await }
            })
            .await
    }

    // -- teardown -----------------------------------------------------------

    /// Delete every registered pair and the remote reference, rebalance out
    /// the non-entry members and stop the primary services. Aborts on the
    /// first error.
    pub async fn teardown(&mut self) -> Result<(), ScenarioError> {
        if self.state == ScenarioState::TornDown {
            return Err(ScenarioError::InvalidState {
                op: "teardown",
                state: self.state,
            });
        }
        let result = self.teardown_inner().await;
        self.state = match result {
            Ok(()) => ScenarioState::TornDown,
            Err(_) => ScenarioState::Failed,
        };
        result
    }

    async fn teardown_inner(&mut self) -> Result<(), ScenarioError> {
        while let Some(pair) = self.topology.pairs().first().cloned() {
            self.index_entry
                .delete_index(&pair.target)
                .await
                .map_err(ScenarioError::Teardown)?;
            self.primary_entry
                .delete_collection(&pair.source)
                .await
                .map_err(ScenarioError::Teardown)?;
            self.topology.remove_pair(&pair.source);
            info!(source = %pair.source, target = %pair.target, "replication pair removed");
        }
        if let Some(remote) = self.remote.clone() {
            self.primary_entry
                .delete_remote_reference(&remote)
                .await
                .map_err(ScenarioError::Teardown)?;
            self.remote = None;
            info!(remote = %remote, "remote reference removed");
        }

        let mut cluster = match self.cluster.take() {
            Some(cluster) => cluster,
            None => {
                warn!("primary-cluster handle lost during run, reversing from entry point");
                PrimaryCluster::new(self.primary_entry.clone())
            }
        };
        let members = cluster.membership().non_entry_members();
        let reversed = cluster.failover_and_rebalance(&members).await;
        self.cluster = Some(cluster);
        reversed.map_err(ScenarioError::Teardown)?;
        if !members.is_empty() {
            info!(members = members.len(), "topology reversed");
        }

        for node in &self.primaries {
            node.stop_service().await.map_err(ScenarioError::Teardown)?;
            info!(member = %node.member().id, "primary service stopped");
        }
        if self.manage_services {
            for node in &self.indexes {
                node.stop_service().await.map_err(ScenarioError::Teardown)?;
                info!(member = %node.member().id, "index service stopped");
            }
        }
        Ok(())
    }
}
