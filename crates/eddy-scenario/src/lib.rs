//! Scenario execution for the replication harness.
//!
//! This crate provides:
//!
//! - [`WorkloadGenerator`] — writes sequential keys until stopped and reports
//!   the acknowledged count through its join handle.
//! - [`PerturbationDriver`] — applies one topology mutation, waits the
//!   settle interval, then stops the workload.
//! - [`ConvergenceVerifier`] — polls the downstream count under a time budget.
//! - [`ReplicationTopology`] — the provisioned and active replication pairs.
//! - [`ScenarioExecutor`] — the setup/run/teardown contract, implemented by
//!   [`RebalanceExecutor`] and [`PassthroughExecutor`].
//! - [`ScenarioRegistry`] — kind tag to executor factory.
//! - [`execute`] — runs one executor to a [`RunReport`](eddy_types::RunReport).

pub mod error;
pub mod executor;
pub mod passthrough;
pub mod perturbation;
pub mod rebalance;
pub mod registry;
pub mod runner;
pub mod timing;
pub mod topology;
pub mod verifier;
pub mod workload;


pub use error::ScenarioError;
pub use executor::{Deployment, RunOutcome, ScenarioEnv, ScenarioExecutor, ScenarioState};
pub use passthrough::PassthroughExecutor;
pub use perturbation::{Perturbation, PerturbationDriver, PerturbationHandle, PerturbationOutcome};
pub use rebalance::RebalanceExecutor;
pub use registry::{ScenarioFactory, ScenarioRegistry};
pub use runner::{Execution, execute};
pub use timing::Timing;
pub use topology::ReplicationTopology;
pub use verifier::ConvergenceVerifier;
pub use workload::{WorkloadGenerator, WorkloadHandle};
