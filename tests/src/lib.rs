//! Shared test harness for Eddy integration tests.
//!
//! Provides [`SimulatedDeployment`] — an in-memory primary cluster and index
//! cluster joined by simulated replication, exposed through the same
//! [`PrimaryNode`] / [`IndexNode`] traits as the REST handles. The
//! simulation enforces the rules a real cluster would (rebalance arguments
//! must match the membership, writes need a connected collection, streams
//! need a remote reference) so executor bookkeeping errors surface as test
//! failures.
//!
//! Failure injection: refused operations, dead members, write failures after
//! N writes, lost or duplicated documents downstream, and replication lag
//! measured in count polls.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use eddy_cluster::{ClusterError, IndexNode, PrimaryNode, RebalanceStatus};
use eddy_scenario::{ScenarioEnv, Timing};
use eddy_types::{
    ClusterMember, Credentials, MemberId, RemoteTarget, ReplicationSlot, ScenarioDefinition,
    ScenarioKind, WorkloadSpec,
};
use tokio::sync::Mutex;

// =========================================================================
// Simulated state
// =========================================================================

/// One replication stream and how far it has caught up.
struct Stream {
    source: String,
    target: String,
    replicated: u64,
}

struct SimState {
    /// Members currently serving in the primary cluster.
    cluster: BTreeSet<MemberId>,
    /// Added but not yet rebalanced in.
    pending_add: BTreeSet<MemberId>,
    /// Ejected or failed over, leaving on the next rebalance.
    leaving: BTreeSet<MemberId>,
    rebalances: usize,

    collections: BTreeMap<String, HashMap<String, Bytes>>,
    connected: HashSet<String>,
    remotes: BTreeSet<String>,
    streams: Vec<Stream>,
    indexes: BTreeSet<String>,

    running: BTreeSet<MemberId>,
    down: HashSet<MemberId>,

    // Fault injection.
    refused: HashSet<&'static str>,
    writes: u64,
    fail_writes_after: Option<u64>,
    replication_step: u64,
    lost: u64,
    duplicated: u64,

    events: Vec<String>,
}

impl SimState {
    fn check(
        &mut self,
        member: &MemberId,
        op: &'static str,
        detail: &str,
    ) -> Result<(), ClusterError> {
        if self.down.contains(member) {
            return Err(rejected(member, op, "member is down"));
        }
        if self.refused.contains(op) {
            return Err(rejected(member, op, "refused by fault plan"));
        }
        if op != "write" {
            if detail.is_empty() {
                self.events.push(op.to_string());
            } else {
                self.events.push(format!("{op} {detail}"));
            }
        }
        Ok(())
    }

    fn count(&mut self, target: &str) -> u64 {
        let step = self.replication_step;
        let collections = &self.collections;
        let replicated = self
            .streams
            .iter_mut()
            .find(|s| s.target == target)
            .map(|stream| {
                let available = collections
                    .get(&stream.source)
                    .map(|docs| docs.len() as u64)
                    .unwrap_or(0);
                stream.replicated = available.min(stream.replicated.saturating_add(step));
                stream.replicated
            })
            .unwrap_or(0);
        if replicated == 0 {
            return 0;
        }
        (replicated + self.duplicated).saturating_sub(self.lost)
    }
}

fn rejected(member: &MemberId, op: &'static str, reason: &str) -> ClusterError {
    ClusterError::Rejected {
        member: member.clone(),
        op,
        reason: reason.to_string(),
    }
}

// =========================================================================
// Member handles
// =========================================================================

/// Simulated primary-cluster member.
pub struct SimPrimaryNode {
    member: ClusterMember,
    state: Arc<Mutex<SimState>>,
}

#[async_trait]
impl PrimaryNode for SimPrimaryNode {
    fn member(&self) -> &ClusterMember {
        &self.member
    }

    async fn init(&self) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "init", &self.member.id.host)
    }

    async fn add_member(&self, member: &ClusterMember) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "add_member", &member.id.host)?;
        if s.cluster.contains(&member.id) || s.pending_add.contains(&member.id) {
            return Err(rejected(&self.member.id, "add_member", "already a member"));
        }
        if s.down.contains(&member.id) {
            return Err(rejected(&self.member.id, "add_member", "member unreachable"));
        }
        s.pending_add.insert(member.id.clone());
        Ok(())
    }

    async fn eject_member(&self, member: &MemberId) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "eject_member", &member.host)?;
        if !s.cluster.contains(member) {
            return Err(rejected(&self.member.id, "eject_member", "not a member"));
        }
        s.leaving.insert(member.clone());
        Ok(())
    }

    async fn failover_member(&self, member: &MemberId) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "failover_member", &member.host)?;
        if !s.cluster.contains(member) {
            return Err(rejected(&self.member.id, "failover_member", "not a member"));
        }
        s.leaving.insert(member.clone());
        Ok(())
    }

    async fn rebalance(&self, known: &[MemberId], eject: &[MemberId]) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "rebalance", &format!("{} {}", known.len(), eject.len()))?;

        let known: BTreeSet<MemberId> = known.iter().cloned().collect();
        let eject: BTreeSet<MemberId> = eject.iter().cloned().collect();
        let staying: BTreeSet<MemberId> = s
            .cluster
            .union(&s.pending_add)
            .filter(|id| !s.leaving.contains(*id))
            .cloned()
            .collect();
        if known != staying {
            return Err(rejected(&self.member.id, "rebalance", "known nodes mismatch"));
        }
        if eject != s.leaving {
            return Err(rejected(&self.member.id, "rebalance", "ejected nodes mismatch"));
        }

        s.cluster = known;
        s.pending_add.clear();
        s.leaving.clear();
        s.rebalances += 1;
        Ok(())
    }

    async fn rebalance_progress(&self) -> Result<RebalanceStatus, ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "rebalance_progress", "")?;
        Ok(RebalanceStatus::Idle)
    }

    async fn create_collection(
        &self,
        name: &str,
        _slot: &ReplicationSlot,
    ) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "create_collection", name)?;
        if s.collections.contains_key(name) {
            return Err(rejected(&self.member.id, "create_collection", "already exists"));
        }
        s.collections.insert(name.to_string(), HashMap::new());
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "delete_collection", name)?;
        if s.collections.remove(name).is_none() {
            return Err(rejected(&self.member.id, "delete_collection", "no such collection"));
        }
        s.connected.remove(name);
        s.streams.retain(|stream| stream.source != name);
        Ok(())
    }

    async fn connect_collection(&self, name: &str) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "connect_collection", name)?;
        if !s.collections.contains_key(name) {
            return Err(rejected(&self.member.id, "connect_collection", "no such collection"));
        }
        s.connected.insert(name.to_string());
        Ok(())
    }

    async fn create_remote_reference(&self, target: &RemoteTarget) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "create_remote_reference", &target.name)?;
        if !s.remotes.insert(target.name.clone()) {
            return Err(rejected(&self.member.id, "create_remote_reference", "already exists"));
        }
        Ok(())
    }

    async fn delete_remote_reference(&self, name: &str) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "delete_remote_reference", name)?;
        if !s.remotes.remove(name) {
            return Err(rejected(&self.member.id, "delete_remote_reference", "no such remote"));
        }
        Ok(())
    }

    async fn create_replication_stream(
        &self,
        source: &str,
        target: &str,
        remote: &str,
    ) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(
            &self.member.id,
            "create_replication_stream",
            &format!("{source} {target}"),
        )?;
        if !s.remotes.contains(remote) {
            return Err(rejected(&self.member.id, "create_replication_stream", "unknown remote"));
        }
        if !s.collections.contains_key(source) || !s.indexes.contains(target) {
            return Err(rejected(&self.member.id, "create_replication_stream", "missing endpoint"));
        }
        s.streams.push(Stream {
            source: source.to_string(),
            target: target.to_string(),
            replicated: 0,
        });
        Ok(())
    }

    async fn write(&self, collection: &str, key: &str, value: Bytes) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "write", "")?;
        if s.fail_writes_after.is_some_and(|limit| s.writes >= limit) {
            return Err(rejected(&self.member.id, "write", "temporary failure"));
        }
        if !s.connected.contains(collection) {
            return Err(ClusterError::NotConnected {
                member: self.member.id.clone(),
                collection: collection.to_string(),
            });
        }
        if let Some(docs) = s.collections.get_mut(collection) {
            docs.insert(key.to_string(), value);
        }
        s.writes += 1;
        Ok(())
    }

    async fn start_service(&self) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "start_service", &self.member.id.host)?;
        s.running.insert(self.member.id.clone());
        Ok(())
    }

    async fn stop_service(&self) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "stop_service", &self.member.id.host)?;
        s.running.remove(&self.member.id);
        Ok(())
    }
}

/// Simulated index-cluster member.
pub struct SimIndexNode {
    member: ClusterMember,
    state: Arc<Mutex<SimState>>,
}

#[async_trait]
impl IndexNode for SimIndexNode {
    fn member(&self) -> &ClusterMember {
        &self.member
    }

    async fn init(&self) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "index_init", &self.member.id.host)
    }

    async fn create_index(&self, name: &str) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "create_index", name)?;
        if !s.indexes.insert(name.to_string()) {
            return Err(rejected(&self.member.id, "create_index", "already exists"));
        }
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "delete_index", name)?;
        if !s.indexes.remove(name) {
            return Err(rejected(&self.member.id, "delete_index", "no such index"));
        }
        s.streams.retain(|stream| stream.target != name);
        Ok(())
    }

    async fn count(&self, name: &str) -> Result<u64, ClusterError> {
        let mut s = self.state.lock().await;
        if s.down.contains(&self.member.id) {
            return Err(rejected(&self.member.id, "count", "member is down"));
        }
        if s.refused.contains("count") {
            return Err(rejected(&self.member.id, "count", "refused by fault plan"));
        }
        if !s.indexes.contains(name) {
            return Err(rejected(&self.member.id, "count", "no such index"));
        }
        Ok(s.count(name))
    }

    async fn start_service(&self) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "index_start_service", &self.member.id.host)?;
        s.running.insert(self.member.id.clone());
        Ok(())
    }

    async fn stop_service(&self) -> Result<(), ClusterError> {
        let mut s = self.state.lock().await;
        s.check(&self.member.id, "index_stop_service", &self.member.id.host)?;
        s.running.remove(&self.member.id);
        Ok(())
    }
}

// =========================================================================
// SimulatedDeployment
// =========================================================================

/// A primary cluster of `n` members and an index cluster of `m` members.
///
/// Every member starts with its service running. The first primary member
/// forms a one-member cluster; the others are standalone until added.
pub struct SimulatedDeployment {
    state: Arc<Mutex<SimState>>,
    primaries: Vec<Arc<SimPrimaryNode>>,
    indexes: Vec<Arc<SimIndexNode>>,
}

impl SimulatedDeployment {
    pub fn new(n: usize, m: usize) -> Self {
        let credentials = Credentials::new("Administrator", "password");
        let primary_members: Vec<ClusterMember> = (1..=n)
            .map(|i| ClusterMember::new(primary_id(i), credentials.clone()))
            .collect();
        let index_members: Vec<ClusterMember> = (1..=m)
            .map(|i| ClusterMember::new(index_id(i), credentials.clone()).with_connector_port(9091))
            .collect();

        let mut cluster = BTreeSet::new();
        if let Some(entry) = primary_members.first() {
            cluster.insert(entry.id.clone());
        }
        let running = primary_members
            .iter()
            .chain(index_members.iter())
            .map(|member| member.id.clone())
            .collect();

        let state = Arc::new(Mutex::new(SimState {
            cluster,
            pending_add: BTreeSet::new(),
            leaving: BTreeSet::new(),
            rebalances: 0,
            collections: BTreeMap::new(),
            connected: HashSet::new(),
            remotes: BTreeSet::new(),
            streams: Vec::new(),
            indexes: BTreeSet::new(),
            running,
            down: HashSet::new(),
            refused: HashSet::new(),
            writes: 0,
            fail_writes_after: None,
            replication_step: u64::MAX,
            lost: 0,
            duplicated: 0,
            events: Vec::new(),
        }));

        let primaries = primary_members
            .into_iter()
            .map(|member| {
                Arc::new(SimPrimaryNode {
                    member,
                    state: state.clone(),
                })
            })
            .collect();
        let indexes = index_members
            .into_iter()
            .map(|member| {
                Arc::new(SimIndexNode {
                    member,
                    state: state.clone(),
                })
            })
            .collect();

        Self {
            state,
            primaries,
            indexes,
        }
    }

    /// Scenario environment over every simulated member, with short waits.
    pub fn env(&self, definition: ScenarioDefinition) -> ScenarioEnv {
        let primaries: Vec<Arc<dyn PrimaryNode>> = self
            .primaries
            .iter()
            .map(|node| node.clone() as Arc<dyn PrimaryNode>)
            .collect();
        let indexes: Vec<Arc<dyn IndexNode>> = self
            .indexes
            .iter()
            .map(|node| node.clone() as Arc<dyn IndexNode>)
            .collect();
        ScenarioEnv::new(definition, primaries, indexes).with_timing(Timing::test_config())
    }

    // ---------------------------------------------------------------------
    // Fault injection
    // ---------------------------------------------------------------------

    /// Refuse every call of `op` from now on.
    pub async fn refuse(&self, op: &'static str) {
        self.state.lock().await.refused.insert(op);
    }

    pub async fn allow(&self, op: &'static str) {
        self.state.lock().await.refused.remove(op);
    }

    /// Make primary member `i` (1-based) unreachable.
    pub async fn kill_primary(&self, i: usize) {
        self.state.lock().await.down.insert(primary_id(i));
    }

    pub async fn revive_primary(&self, i: usize) {
        self.state.lock().await.down.remove(&primary_id(i));
    }

    /// Refuse writes once `n` writes were acknowledged in total.
    pub async fn fail_writes_after(&self, n: u64) {
        self.state.lock().await.fail_writes_after = Some(n);
    }

    /// Each count poll lets replication advance by at most `step` documents.
    pub async fn set_replication_step(&self, step: u64) {
        self.state.lock().await.replication_step = step;
    }

    /// Drop `n` documents between source and index.
    pub async fn lose_documents(&self, n: u64) {
        self.state.lock().await.lost = n;
    }

    /// Index `n` documents twice.
    pub async fn duplicate_documents(&self, n: u64) {
        self.state.lock().await.duplicated = n;
    }

    // ---------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------

    pub fn primary_id(&self, i: usize) -> MemberId {
        primary_id(i)
    }

    /// Members currently serving in the primary cluster.
    pub async fn cluster_members(&self) -> BTreeSet<MemberId> {
        self.state.lock().await.cluster.clone()
    }

    pub async fn rebalance_count(&self) -> usize {
        self.state.lock().await.rebalances
    }

    pub async fn collections(&self) -> Vec<String> {
        self.state.lock().await.collections.keys().cloned().collect()
    }

    pub async fn indexes(&self) -> Vec<String> {
        self.state.lock().await.indexes.iter().cloned().collect()
    }

    pub async fn stream_count(&self) -> usize {
        self.state.lock().await.streams.len()
    }

    /// Documents stored in `collection` (0 if it does not exist).
    pub async fn document_count(&self, collection: &str) -> u64 {
        self.state
            .lock()
            .await
            .collections
            .get(collection)
            .map(|docs| docs.len() as u64)
            .unwrap_or(0)
    }

    /// Stored value of `key` in `collection`.
    pub async fn document(&self, collection: &str, key: &str) -> Option<Bytes> {
        self.state
            .lock()
            .await
            .collections
            .get(collection)
            .and_then(|docs| docs.get(key).cloned())
    }

    /// Members whose service process is running.
    pub async fn running_services(&self) -> BTreeSet<MemberId> {
        self.state.lock().await.running.clone()
    }

    /// Control-plane calls in order, excluding writes and count reads.
    pub async fn events(&self) -> Vec<String> {
        self.state.lock().await.events.clone()
    }

    /// Index of the first event starting with `prefix`.
    pub async fn event_position(&self, prefix: &str) -> Option<usize> {
        self.events().await.iter().position(|e| e.starts_with(prefix))
    }
}

pub fn primary_id(i: usize) -> MemberId {
    MemberId::new(format!("10.0.0.{i}"), 8091)
}

pub fn index_id(i: usize) -> MemberId {
    MemberId::new(format!("10.0.1.{i}"), 9200)
}

/// Scenario definition with small values and `slots` replication slots.
pub fn scenario(kind: ScenarioKind, item_count: Option<u64>, slots: usize) -> ScenarioDefinition {
    let mut definition = ScenarioDefinition::new(kind);
    definition.description = format!("{kind} against the simulated deployment");
    definition.workload = WorkloadSpec {
        item_count,
        item_size: 64,
    };
    definition.replications = vec![ReplicationSlot::default(); slots];
    definition
}
