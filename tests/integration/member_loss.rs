//! Integration test: members leave the cluster under load.
//!
//! Eject or fail over the last members while the workload runs; the index
//! must still end up with every acknowledged write.

use eddy_integration_tests::{SimulatedDeployment, scenario};
use eddy_scenario::{Perturbation, RebalanceExecutor, ScenarioExecutor, execute};
use eddy_types::{LivenessRole, ScenarioKind, Verdict};

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_remove_member_under_load() {
    let d = SimulatedDeployment::new(3, 1);
    let mut definition = scenario(ScenarioKind::RemoveRebalance, None, 1);
    definition.remove_count = 1;

    let mut executor = RebalanceExecutor::new(d.env(definition)).unwrap();
    // Nothing is marked before the cluster acknowledges the eject.
    assert_eq!(executor.deployment().roster()[2].role, LivenessRole::Active);

    executor.setup().await.unwrap();
    assert_eq!(d.cluster_members().await.len(), 3);

    let outcome = executor.run().await.unwrap();
    assert!(outcome.convergence.converged());

    let members = d.cluster_members().await;
    assert!(!members.contains(&d.primary_id(3)));
    assert!(members.contains(&d.primary_id(2)));
    assert!(d.event_position("eject_member 10.0.0.3").await.is_some());
    let roster = executor.deployment().roster();
    assert_eq!(roster[1].role, LivenessRole::Active);
    assert_eq!(roster[2].role, LivenessRole::Removed);

    executor.teardown().await.unwrap();
    // Only member 2 was still in the cluster to fail over.
    let events = d.events().await;
    assert_eq!(events.iter().filter(|e| e.starts_with("failover_member")).count(), 1);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_failover_two_members_under_load() {
    let d = SimulatedDeployment::new(4, 1);
    let mut definition = scenario(ScenarioKind::FailoverRebalance, Some(400), 1);
    definition.failover_count = 2;

    let mut executor = RebalanceExecutor::new(d.env(definition)).unwrap();
    assert_eq!(
        executor.perturbation(),
        &Perturbation::Failover(vec![d.primary_id(3), d.primary_id(4)])
    );

    let execution = execute(&mut executor).await;

    assert_eq!(execution.report.verdict, Verdict::Passed);
    assert_eq!(execution.report.observed, 400);
    assert!(execution.teardown.is_ok());
    assert_eq!(d.cluster_members().await.len(), 1);
}

/// A member that died after setup can still be failed over through the
/// entry point.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_failover_of_dead_member() {
    let d = SimulatedDeployment::new(3, 1);
    let mut definition = scenario(ScenarioKind::FailoverRebalance, Some(100), 1);
    definition.failover_count = 1;

    let mut executor = RebalanceExecutor::new(d.env(definition)).unwrap();
    executor.setup().await.unwrap();
    d.kill_primary(3).await;

    let outcome = executor.run().await.unwrap();
    assert!(outcome.convergence.converged());
    assert!(!d.cluster_members().await.contains(&d.primary_id(3)));

    // Stopping the dead member's service fails until it comes back.
    assert!(executor.teardown().await.is_err());
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_dead_member_revived_before_teardown() {
    let d = SimulatedDeployment::new(3, 1);
    let mut definition = scenario(ScenarioKind::FailoverRebalance, Some(100), 1);
    definition.failover_count = 1;

    let mut executor = RebalanceExecutor::new(d.env(definition)).unwrap();
    executor.setup().await.unwrap();
    d.kill_primary(3).await;
    executor.run().await.unwrap();
    d.revive_primary(3).await;

    executor.teardown().await.unwrap();
    assert!(!d.running_services().await.contains(&d.primary_id(3)));
}

/// The failover was acknowledged but its rebalance was not: the member stays
/// pending and teardown ejects it along with the rest.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_refused_rebalance_leaves_member_pending_eject() {
    let d = SimulatedDeployment::new(3, 1);
    let mut definition = scenario(ScenarioKind::FailoverRebalance, Some(50), 1);
    definition.failover_count = 1;
    let mut executor = RebalanceExecutor::new(d.env(definition)).unwrap();
    executor.setup().await.unwrap();

    d.refuse("rebalance").await;
    assert!(executor.run().await.is_err());
    assert_eq!(executor.deployment().roster()[2].role, LivenessRole::PendingEject);
    assert!(d.cluster_members().await.contains(&d.primary_id(3)));

    d.allow("rebalance").await;
    executor.teardown().await.unwrap();
    assert_eq!(d.cluster_members().await.len(), 1);
}

#[test]
fn test_more_removals_than_members_is_rejected() {
    let d = SimulatedDeployment::new(2, 1);
    let mut definition = scenario(ScenarioKind::RemoveRebalance, None, 1);
    definition.remove_count = 2;

    assert!(RebalanceExecutor::new(d.env(definition)).is_err());
}
