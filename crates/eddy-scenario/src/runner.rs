//! Drives one executor through all three phases and produces its report.

use std::time::Duration;

use eddy_types::{RunReport, Verdict};
use tracing::{error, info, warn};

use crate::error::ScenarioError;
use crate::executor::ScenarioExecutor;

/// The report of a run plus the outcome of its teardown.
///
/// A teardown failure does not change the verdict; the caller decides how
/// fatal it is.
#[derive(Debug)]
pub struct Execution {
    pub report: RunReport,
    pub teardown: Result<(), ScenarioError>,
}

/// Setup, run and verify, then always tear down.
///
/// Every run ends with exactly one verdict: a setup error skips the run
/// phase, a run error skips verification, and a completed run passes only if
/// the downstream count matched exactly.
pub async fn execute(executor: &mut dyn ScenarioExecutor) -> Execution {
    let definition = executor.definition();
    let mut report = RunReport {
        scenario: definition.kind,
        description: definition.description.clone(),
        verdict: Verdict::Passed,
        observed: 0,
        expected: 0,
        elapsed: Duration::ZERO,
        convergence: None,
        error: None,
    };
    info!(scenario = %report.scenario, description = %report.description, "scenario starting");

    match executor.setup().await {
        Err(e) => {
            error!(scenario = %report.scenario, error = %e, "setup failed");
            report.verdict = Verdict::FailedAtSetup;
            report.error = Some(e.to_string());
        }
        Ok(()) => match executor.run().await {
            Ok(outcome) => {
                let convergence = outcome.convergence;
                report.elapsed = outcome.elapsed;
                report.observed = convergence.observed;
                report.expected = convergence.expected;
                report.verdict = if convergence.converged() {
                    Verdict::Passed
                } else {
                    Verdict::FailedToConverge
                };
                report.convergence = Some(convergence.outcome);
            }
            Err(e) => {
                error!(scenario = %report.scenario, error = %e, "run failed");
                report.verdict = Verdict::FailedDuringRun;
                report.expected = e.acknowledged().unwrap_or(0);
                report.error = Some(e.to_string());
            }
        },
    }

    let teardown = executor.teardown().await;
    if let Err(e) = &teardown {
        error!(scenario = %report.scenario, error = %e, "teardown failed");
    }

    if report.verdict.is_pass() {
        info!(
            scenario = %report.scenario,
            observed = report.observed,
            expected = report.expected,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "scenario passed"
        );
    } else {
        warn!(
            scenario = %report.scenario,
            verdict = %report.verdict,
            observed = report.observed,
            expected = report.expected,
            "scenario did not pass"
        );
    }

    Execution { report, teardown }
}
