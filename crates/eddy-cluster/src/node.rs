//! Capability traits for one member of each cluster.

use bytes::Bytes;
use eddy_types::{ClusterMember, MemberId, RemoteTarget, ReplicationSlot, REMOTE_REFERENCE_NAME};

use crate::error::ClusterError;

/// State reported by the primary cluster's rebalance progress endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceStatus {
    /// No rebalance is running.
    Idle,
    /// A rebalance is in progress.
    Running,
    /// Any other status string the cluster reported.
    Other(String),
}

impl RebalanceStatus {
    pub fn from_status(status: &str) -> Self {
        match status {
            "none" => RebalanceStatus::Idle,
            "running" => RebalanceStatus::Running,
            other => RebalanceStatus::Other(other.to_string()),
        }
    }
}

/// Control plane of one primary-cluster member.
///
/// Cluster-wide operations (membership, collections, replication) are only
/// issued against the entry-point member; [`init`](Self::init) and the
/// service operations apply to every member. All calls are one-shot: the
/// harness never retries them.
#[async_trait::async_trait]
pub trait PrimaryNode: Send + Sync {
    /// The member this handle controls.
    fn member(&self) -> &ClusterMember;

    /// Initialize the member's admin settings.
    async fn init(&self) -> Result<(), ClusterError>;

    /// Join `member` to this member's cluster.
    async fn add_member(&self, member: &ClusterMember) -> Result<(), ClusterError>;

    /// Mark `member` for ejection on the next rebalance.
    async fn eject_member(&self, member: &MemberId) -> Result<(), ClusterError>;

    /// Hard-fail `member` over.
    async fn failover_member(&self, member: &MemberId) -> Result<(), ClusterError>;

    /// Start a rebalance across `known`, removing `eject`.
    async fn rebalance(&self, known: &[MemberId], eject: &[MemberId]) -> Result<(), ClusterError>;

    /// Query the current rebalance status.
    async fn rebalance_progress(&self) -> Result<RebalanceStatus, ClusterError>;

    /// Create the source collection `name`.
    async fn create_collection(
        &self,
        name: &str,
        slot: &ReplicationSlot,
    ) -> Result<(), ClusterError>;

    /// Delete the source collection `name`.
    async fn delete_collection(&self, name: &str) -> Result<(), ClusterError>;

    /// Open the data-plane handle used by [`write`](Self::write).
    async fn connect_collection(&self, name: &str) -> Result<(), ClusterError>;

    /// Register the index cluster as a replication destination.
    async fn create_remote_reference(&self, target: &RemoteTarget) -> Result<(), ClusterError>;

    /// Remove the remote reference `name` with its remaining streams.
    async fn delete_remote_reference(&self, name: &str) -> Result<(), ClusterError>;

    /// Start continuous replication from `source` to `target` over `remote`.
    async fn create_replication_stream(
        &self,
        source: &str,
        target: &str,
        remote: &str,
    ) -> Result<(), ClusterError>;

    /// Store `value` under `key`. Returns once the write is acknowledged.
    async fn write(&self, collection: &str, key: &str, value: Bytes) -> Result<(), ClusterError>;

    /// Start the member's service process.
    async fn start_service(&self) -> Result<(), ClusterError>;

    /// Stop the member's service process.
    async fn stop_service(&self) -> Result<(), ClusterError>;
}

/// Control plane of one index-cluster member.
#[async_trait::async_trait]
pub trait IndexNode: Send + Sync {
    /// The member this handle controls.
    fn member(&self) -> &ClusterMember;

    /// Check that the member is reachable.
    async fn init(&self) -> Result<(), ClusterError>;

    async fn create_index(&self, name: &str) -> Result<(), ClusterError>;

    async fn delete_index(&self, name: &str) -> Result<(), ClusterError>;

    /// Number of replicated documents in index `name`.
    async fn count(&self, name: &str) -> Result<u64, ClusterError>;

    async fn start_service(&self) -> Result<(), ClusterError>;

    async fn stop_service(&self) -> Result<(), ClusterError>;
}

/// Remote-cluster reference pointing at an index member's replication
/// connector (falls back to the control port when no connector port is set).
pub fn remote_target(member: &ClusterMember) -> RemoteTarget {
    let port = member.connector_port.unwrap_or(member.id.port);
    RemoteTarget {
        name: REMOTE_REFERENCE_NAME.to_string(),
        hostname: format!("{}:{}", member.id.host, port),
        credentials: member.credentials.clone(),
    }
}
