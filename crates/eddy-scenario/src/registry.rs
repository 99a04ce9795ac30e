//! Maps scenario kinds to executor factories.

use std::collections::BTreeMap;

use eddy_types::ScenarioKind;
use tracing::debug;

use crate::error::ScenarioError;
use crate::executor::{ScenarioEnv, ScenarioExecutor};
use crate::passthrough::PassthroughExecutor;
use crate::rebalance::RebalanceExecutor;

/// Builds an executor from its environment, validating the definition.
pub type ScenarioFactory = fn(ScenarioEnv) -> Result<Box<dyn ScenarioExecutor>, ScenarioError>;

pub struct ScenarioRegistry {
    factories: BTreeMap<ScenarioKind, ScenarioFactory>,
}

impl ScenarioRegistry {
    /// A registry with no kinds.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry with every built-in kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(ScenarioKind::AddRebalance, RebalanceExecutor::boxed);
        registry.register(ScenarioKind::RemoveRebalance, RebalanceExecutor::boxed);
        registry.register(ScenarioKind::FailoverRebalance, RebalanceExecutor::boxed);
        registry.register(ScenarioKind::Passthrough, PassthroughExecutor::boxed);
        registry
    }

    /// Register `factory` for `kind`, replacing any earlier one.
    pub fn register(&mut self, kind: ScenarioKind, factory: ScenarioFactory) {
        self.factories.insert(kind, factory);
    }

    pub fn contains(&self, kind: ScenarioKind) -> bool {
        self.factories.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ScenarioKind> + '_ {
        self.factories.keys().copied()
    }

    /// Build the executor for `env.definition.kind`.
    pub fn build(&self, env: ScenarioEnv) -> Result<Box<dyn ScenarioExecutor>, ScenarioError> {
        let kind = env.definition.kind;
        let factory = self
            .factories
            .get(&kind)
            .ok_or(ScenarioError::Unregistered(kind))?;
        debug!(scenario = %kind, "building scenario executor");
        factory(env)
    }
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
