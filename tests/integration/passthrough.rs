//! Integration test: load first, replicate afterwards.

use eddy_integration_tests::{SimulatedDeployment, scenario};
use eddy_scenario::{PassthroughExecutor, ScenarioExecutor, execute};
use eddy_types::{ConvergenceOutcome, ScenarioKind, Verdict};

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_existing_documents_replicate() {
    let d = SimulatedDeployment::new(2, 1);
    let mut executor =
        PassthroughExecutor::new(d.env(scenario(ScenarioKind::Passthrough, Some(200), 1))).unwrap();

    executor.setup().await.unwrap();
    // Both members serve from the start: passthrough holds nobody back.
    assert_eq!(d.cluster_members().await.len(), 2);

    let outcome = executor.run().await.unwrap();
    assert!(outcome.convergence.converged());
    assert_eq!(outcome.convergence.observed, 200);

    // Replication starts only once the batch is in.
    let events = d.events().await;
    let stream = events
        .iter()
        .position(|e| e.starts_with("create_replication_stream"))
        .unwrap();
    let remote = events
        .iter()
        .position(|e| e.starts_with("create_remote_reference"))
        .unwrap();
    assert!(remote < stream);
    assert_eq!(d.document_count("bucket-0").await, 200);

    executor.teardown().await.unwrap();
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_slow_replication_within_budget_passes() {
    let d = SimulatedDeployment::new(1, 1);
    d.set_replication_step(25).await;
    let mut executor =
        PassthroughExecutor::new(d.env(scenario(ScenarioKind::Passthrough, Some(100), 1))).unwrap();

    let execution = execute(&mut executor).await;

    assert_eq!(execution.report.verdict, Verdict::Passed);
    assert_eq!(execution.report.convergence, Some(ConvergenceOutcome::Exact));
    assert!(execution.teardown.is_ok());
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_replication_too_slow_for_budget_fails() {
    let d = SimulatedDeployment::new(1, 1);
    // 1 s budget at 10 ms polls is about 100 reads; 20k documents at 10
    // per read never get there.
    d.set_replication_step(10).await;
    let mut executor = PassthroughExecutor::new(d.env(scenario(
        ScenarioKind::Passthrough,
        Some(20_000),
        1,
    )))
    .unwrap();

    let report = execute(&mut executor).await.report;

    assert_eq!(report.verdict, Verdict::FailedToConverge);
    assert_eq!(report.convergence, Some(ConvergenceOutcome::TimedOut));
    assert_eq!(report.expected, 20_000);
    assert!(report.observed < report.expected);
    assert!(report.observed > 0);
}
