//! Shared types for the Eddy replication harness.
//!
//! This crate defines the data model used across the workspace:
//! member identity ([`MemberId`], [`ClusterMember`], [`LivenessRole`]),
//! replication layout ([`ReplicationSlot`], [`CollectionPair`],
//! [`ReplicationBinding`]), scenario input ([`ScenarioDefinition`],
//! [`ScenarioKind`], [`WorkloadSpec`]) and run output
//! ([`ConvergenceResult`], [`Verdict`], [`RunReport`]).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Prefix of source collection names created during setup.
pub const SOURCE_COLLECTION_SEED: &str = "bucket";

/// Prefix of target index names created during setup.
pub const TARGET_INDEX_SEED: &str = "index";

/// Name of the remote-cluster reference registered on the primary cluster.
pub const REMOTE_REFERENCE_NAME: &str = "remote";

/// Prefix of document keys issued by the workload generator.
pub const KEY_SEED: &str = "key";

/// Source collection name for replication slot `slot`.
pub fn source_collection_name(slot: usize) -> String {
    format!("{SOURCE_COLLECTION_SEED}-{slot}")
}

/// Target index name for replication slot `slot`.
pub fn target_index_name(slot: usize) -> String {
    format!("{TARGET_INDEX_SEED}-{slot}")
}

/// Document key for the `n`-th workload write.
pub fn workload_key(n: u64) -> String {
    format!("{KEY_SEED}_{n}")
}

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

/// Network identity of a cluster member: host plus control-plane port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MemberId {
    /// Hostname or IP address.
    pub host: String,
    /// Control-plane (REST) port.
    pub port: u16,
}

impl MemberId {
    /// Create a member identity.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Cluster-internal node name used in rebalance and eject requests.
    pub fn otp_name(&self) -> String {
        format!("ns_1@{}", self.host)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Username/password pair for a control plane or a remote shell.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where a member sits relative to the cluster topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LivenessRole {
    /// Serving member of the cluster.
    #[default]
    Active,
    /// Provisioned but held back until the perturbation adds it.
    PendingAdd,
    /// Marked for removal by the next rebalance.
    PendingEject,
    /// Rebalanced out by an eject or failover.
    Removed,
}

/// One member of either cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMember {
    /// Network identity.
    pub id: MemberId,
    /// Control-plane credentials.
    pub credentials: Credentials,
    /// Remote-shell credentials used to start/stop the service process.
    pub shell: Option<Credentials>,
    /// Port accepting replication traffic (index members only).
    pub connector_port: Option<u16>,
    /// Current liveness role.
    pub role: LivenessRole,
}

impl ClusterMember {
    /// Create an active member with no shell access.
    pub fn new(id: MemberId, credentials: Credentials) -> Self {
        Self {
            id,
            credentials,
            shell: None,
            connector_port: None,
            role: LivenessRole::Active,
        }
    }

    pub fn with_shell(mut self, shell: Credentials) -> Self {
        self.shell = Some(shell);
        self
    }

    pub fn with_connector_port(mut self, port: u16) -> Self {
        self.connector_port = Some(port);
        self
    }

    pub fn with_role(mut self, role: LivenessRole) -> Self {
        self.role = role;
        self
    }
}

// ---------------------------------------------------------------------------
// Replication layout
// ---------------------------------------------------------------------------

/// Kind of source collection to create on the primary cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketType {
    /// Persistent, replicated bucket.
    #[default]
    Couchbase,
    /// Memory-only bucket.
    Memcached,
}

impl BucketType {
    /// Value of the `bucketType` form field.
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketType::Couchbase => "couchbase",
            BucketType::Memcached => "memcached",
        }
    }
}

/// One configured replication slot: a source collection that gets a
/// matching target index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationSlot {
    pub bucket_type: BucketType,
    /// Memory quota of the source collection in megabytes.
    pub quota_mb: u32,
    /// Number of replicas of the source collection.
    pub replica_count: u32,
}

impl Default for ReplicationSlot {
    fn default() -> Self {
        Self {
            bucket_type: BucketType::Couchbase,
            quota_mb: 200,
            replica_count: 1,
        }
    }
}

/// A provisioned (source collection, target index) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionPair {
    pub source: String,
    pub target: String,
}

impl CollectionPair {
    pub fn for_slot(slot: usize) -> Self {
        Self {
            source: source_collection_name(slot),
            target: target_index_name(slot),
        }
    }
}

/// A pair under active continuous replication, riding on a named
/// remote-cluster reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationBinding {
    pub source: String,
    pub target: String,
    pub remote: String,
}

/// Remote-cluster reference target: the index cluster entry point as seen
/// from the primary cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTarget {
    /// Reference name (see [`REMOTE_REFERENCE_NAME`]).
    pub name: String,
    /// `host:port` of the replication connector.
    pub hostname: String,
    pub credentials: Credentials,
}

// ---------------------------------------------------------------------------
// Scenario input
// ---------------------------------------------------------------------------

/// Tag selecting one scenario strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Add held-back members under load, then rebalance.
    AddRebalance,
    /// Eject members under load, then rebalance.
    RemoveRebalance,
    /// Fail over members under load, then rebalance them out.
    FailoverRebalance,
    /// Load first, then replicate; no topology change.
    Passthrough,
}

impl ScenarioKind {
    /// All kinds, in registry order.
    pub const ALL: [ScenarioKind; 4] = [
        ScenarioKind::AddRebalance,
        ScenarioKind::RemoveRebalance,
        ScenarioKind::FailoverRebalance,
        ScenarioKind::Passthrough,
    ];

    /// Canonical tag.
    pub fn tag(&self) -> &'static str {
        match self {
            ScenarioKind::AddRebalance => "add-rebalance",
            ScenarioKind::RemoveRebalance => "remove-rebalance",
            ScenarioKind::FailoverRebalance => "failover-rebalance",
            ScenarioKind::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Error returned when a scenario tag matches no known kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownScenarioKind(pub String);

impl fmt::Display for UnknownScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown scenario kind: {}", self.0)
    }
}

impl std::error::Error for UnknownScenarioKind {}

impl FromStr for ScenarioKind {
    type Err = UnknownScenarioKind;

    /// Case-insensitive; accepts the canonical tag and the short ids used by
    /// situation catalogs (`addrb`, `removerb`, `failoverrb`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "addrebalance" | "addrb" => Ok(ScenarioKind::AddRebalance),
            "removerebalance" | "removerb" => Ok(ScenarioKind::RemoveRebalance),
            "failoverrebalance" | "failoverrb" => Ok(ScenarioKind::FailoverRebalance),
            "passthrough" => Ok(ScenarioKind::Passthrough),
            _ => Err(UnknownScenarioKind(s.to_string())),
        }
    }
}

/// Shape of the write workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Stop after this many acknowledged writes. `None` runs until the
    /// perturbation signals a stop.
    pub item_count: Option<u64>,
    /// Size of each written value in bytes.
    pub item_size: usize,
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        Self {
            item_count: None,
            item_size: 256,
        }
    }
}

/// Immutable parameters of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub kind: ScenarioKind,
    pub description: String,
    /// Data-manipulation action id the workload performs.
    pub action: String,
    /// Expected number of primary cluster members.
    pub node_count: usize,
    /// Replica count applied to source collections.
    pub replica_count: u32,
    /// Members failed over by the perturbation.
    pub failover_count: usize,
    /// Members added by the perturbation.
    pub add_count: usize,
    /// Members ejected by the perturbation.
    pub remove_count: usize,
    pub workload: WorkloadSpec,
    /// One entry per source collection / target index pair.
    pub replications: Vec<ReplicationSlot>,
}

impl ScenarioDefinition {
    /// A definition with no perturbation counts and a single replication slot.
    pub fn new(kind: ScenarioKind) -> Self {
        Self {
            kind,
            description: String::new(),
            action: "set".to_string(),
            node_count: 1,
            replica_count: 1,
            failover_count: 0,
            add_count: 0,
            remove_count: 0,
            workload: WorkloadSpec::default(),
            replications: vec![ReplicationSlot::default()],
        }
    }
}

// ---------------------------------------------------------------------------
// Run output
// ---------------------------------------------------------------------------

/// How the convergence poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceOutcome {
    /// Downstream count equals the workload count.
    Exact,
    /// Downstream count exceeded the workload count.
    Overshoot,
    /// Budget elapsed below the workload count.
    TimedOut,
    /// A count read failed; polling stopped.
    ReadFailed(String),
}

/// Result of one verification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceResult {
    /// Last downstream count read (0 if no read succeeded).
    pub observed: u64,
    /// Workload count the downstream index must reach.
    pub expected: u64,
    /// Time spent polling.
    pub elapsed: Duration,
    /// Number of count reads attempted.
    pub polls: u32,
    pub outcome: ConvergenceOutcome,
}

impl ConvergenceResult {
    /// Only an exact match counts as convergence.
    pub fn converged(&self) -> bool {
        self.outcome == ConvergenceOutcome::Exact
    }
}

/// Final verdict of a scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Passed,
    FailedAtSetup,
    FailedDuringRun,
    FailedToConverge,
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Passed)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Passed => "passed",
            Verdict::FailedAtSetup => "failed at setup",
            Verdict::FailedDuringRun => "failed during run",
            Verdict::FailedToConverge => "failed to converge",
        };
        f.write_str(s)
    }
}

/// Everything reported about one run, whatever its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub scenario: ScenarioKind,
    pub description: String,
    pub verdict: Verdict,
    /// Downstream count at the end of verification (0 if never read).
    pub observed: u64,
    /// Workload count (0 if the workload never completed).
    pub expected: u64,
    /// Wall-clock duration of the run phase.
    pub elapsed: Duration,
    /// Convergence outcome, when verification ran.
    pub convergence: Option<ConvergenceOutcome>,
    /// Error that ended the run early, if any.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
