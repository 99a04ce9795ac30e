//! Replication topology map: provisioned pairs and the bindings actively
//! replicating between them.

use eddy_types::{CollectionPair, ReplicationBinding};

/// Pairs are registered in setup; a binding is recorded only once both the
/// remote reference and the replication stream exist.
#[derive(Debug, Default, Clone)]
pub struct ReplicationTopology {
    pairs: Vec<CollectionPair>,
    bindings: Vec<ReplicationBinding>,
}

impl ReplicationTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pair(&mut self, pair: CollectionPair) {
        if !self.pairs.contains(&pair) {
            self.pairs.push(pair);
        }
    }

    pub fn pairs(&self) -> &[CollectionPair] {
        &self.pairs
    }

    /// The pair the workload writes to and the verifier reads from.
    pub fn primary_pair(&self) -> Option<&CollectionPair> {
        self.pairs.first()
    }

    /// Record a live replication stream. Returns `false` if the source has no
    /// registered pair.
    pub fn activate(&mut self, binding: ReplicationBinding) -> bool {
        if !self.pairs.iter().any(|p| p.source == binding.source) {
            return false;
        }
        if !self.is_active(&binding.source) {
            self.bindings.push(binding);
        }
        true
    }

    pub fn bindings(&self) -> &[ReplicationBinding] {
        &self.bindings
    }

    pub fn is_active(&self, source: &str) -> bool {
        self.bindings.iter().any(|b| b.source == source)
    }

    /// Forget a pair and any binding on it.
    pub fn remove_pair(&mut self, source: &str) {
        self.pairs.retain(|p| p.source != source);
        self.bindings.retain(|b| b.source != source);
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}
