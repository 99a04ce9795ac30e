//! The primary-cluster handle: entry point plus membership view.

use std::sync::Arc;

use eddy_types::{ClusterMember, MemberId};
use tracing::{debug, info};

use crate::error::ClusterError;
use crate::membership::Membership;
use crate::node::{PrimaryNode, RebalanceStatus};

/// Issues topology mutations through the entry-point member and keeps the
/// KnownSet/EjectSet in step with what the cluster acknowledged.
///
/// Not shared: exactly one task owns it at a time. The scenario executor
/// hands it to the perturbation driver for the duration of a run and gets it
/// back through the driver's join handle.
pub struct PrimaryCluster {
    entry: Arc<dyn PrimaryNode>,
    membership: Membership,
}

impl PrimaryCluster {
    pub fn new(entry: Arc<dyn PrimaryNode>) -> Self {
        let membership = Membership::new(entry.member().id.clone());
        Self { entry, membership }
    }

    /// The entry-point member handle.
    pub fn entry(&self) -> &Arc<dyn PrimaryNode> {
        &self.entry
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    /// Add each member, then rebalance them in. No-op for an empty slice.
    pub async fn add_and_rebalance(
        &mut self,
        members: &[ClusterMember],
    ) -> Result<(), ClusterError> {
        if members.is_empty() {
            return Ok(());
        }
        for member in members {
            self.entry.add_member(member).await?;
            self.membership.record_added(member.id.clone());
            info!(member = %member.id, "member added");
        }
        self.rebalance().await
    }

    /// Eject each member, then rebalance them out. No-op for an empty slice.
    pub async fn remove_and_rebalance(&mut self, members: &[MemberId]) -> Result<(), ClusterError> {
        if members.is_empty() {
            return Ok(());
        }
        for id in members {
            self.membership.ensure_ejectable(id)?;
            self.entry.eject_member(id).await?;
            self.membership.record_ejected(id)?;
            info!(member = %id, "member marked for ejection");
        }
        self.rebalance().await
    }

    /// Fail each member over, then rebalance them out. No-op for an empty
    /// slice.
    pub async fn failover_and_rebalance(
        &mut self,
        members: &[MemberId],
    ) -> Result<(), ClusterError> {
        if members.is_empty() {
            return Ok(());
        }
        for id in members {
            self.membership.ensure_ejectable(id)?;
            self.entry.failover_member(id).await?;
            self.membership.record_ejected(id)?;
            info!(member = %id, "member failed over");
        }
        self.rebalance().await
    }

    /// Rebalance with the current KnownSet/EjectSet.
    pub async fn rebalance(&mut self) -> Result<(), ClusterError> {
        let (known, eject) = self.membership.rebalance_args();
        debug!(known = known.len(), eject = eject.len(), "starting rebalance");
        self.entry.rebalance(&known, &eject).await?;
        let left = self.membership.complete_rebalance();
        info!(
            known = known.len(),
            ejected = left.len(),
            "rebalance accepted"
        );
        Ok(())
    }

    pub async fn rebalance_progress(&self) -> Result<RebalanceStatus, ClusterError> {
        self.entry.rebalance_progress().await
    }
}

impl std::fmt::Debug for PrimaryCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryCluster")
            .field("entry", &self.entry.member().id)
            .field("membership", &self.membership)
            .finish()
    }
}
