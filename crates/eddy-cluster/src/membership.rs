//! KnownSet / EjectSet bookkeeping for one primary cluster.
//!
//! The two sets are mutually exclusive. A member enters the KnownSet when an
//! add request is acknowledged and moves to the EjectSet only when an eject
//! or failover request is acknowledged. A rebalance that the cluster accepts
//! drops the EjectSet.

use std::collections::BTreeSet;

use eddy_types::MemberId;

use crate::error::ClusterError;

/// Membership view used to build rebalance arguments.
#[derive(Debug, Clone)]
pub struct Membership {
    entry: MemberId,
    known: BTreeSet<MemberId>,
    eject: BTreeSet<MemberId>,
}

impl Membership {
    /// Start with the entry point as the only known member.
    pub fn new(entry: MemberId) -> Self {
        let mut known = BTreeSet::new();
        known.insert(entry.clone());
        Self {
            entry,
            known,
            eject: BTreeSet::new(),
        }
    }

    pub fn entry(&self) -> &MemberId {
        &self.entry
    }

    pub fn is_known(&self, id: &MemberId) -> bool {
        self.known.contains(id)
    }

    pub fn is_ejecting(&self, id: &MemberId) -> bool {
        self.eject.contains(id)
    }

    /// Members that stay in the cluster after the next rebalance.
    pub fn known(&self) -> impl Iterator<Item = &MemberId> {
        self.known.iter()
    }

    /// Members the next rebalance removes.
    pub fn ejecting(&self) -> impl Iterator<Item = &MemberId> {
        self.eject.iter()
    }

    /// Known members other than the entry point, in stable order.
    pub fn non_entry_members(&self) -> Vec<MemberId> {
        self.known
            .iter()
            .filter(|id| **id != self.entry)
            .cloned()
            .collect()
    }

    /// Check that `id` may be ejected or failed over.
    pub fn ensure_ejectable(&self, id: &MemberId) -> Result<(), ClusterError> {
        if *id == self.entry {
            return Err(ClusterError::EntryPoint(id.clone()));
        }
        if !self.known.contains(id) {
            return Err(ClusterError::UnknownMember(id.clone()));
        }
        Ok(())
    }

    /// Record an acknowledged add request.
    pub fn record_added(&mut self, id: MemberId) {
        self.eject.remove(&id);
        self.known.insert(id);
    }

    /// Record an acknowledged eject or failover request.
    pub fn record_ejected(&mut self, id: &MemberId) -> Result<(), ClusterError> {
        self.ensure_ejectable(id)?;
        self.known.remove(id);
        self.eject.insert(id.clone());
        Ok(())
    }

    /// `(known, eject)` argument lists for a rebalance call.
    pub fn rebalance_args(&self) -> (Vec<MemberId>, Vec<MemberId>) {
        (
            self.known.iter().cloned().collect(),
            self.eject.iter().cloned().collect(),
        )
    }

    /// Record an accepted rebalance: ejected members leave the cluster.
    /// Returns the members that left.
    pub fn complete_rebalance(&mut self) -> Vec<MemberId> {
        std::mem::take(&mut self.eject).into_iter().collect()
    }
}
