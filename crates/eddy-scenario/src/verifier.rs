//! Bounded polling of the downstream count.

use std::future::Future;
use std::time::Duration;

use eddy_cluster::ClusterError;
use eddy_types::{ConvergenceOutcome, ConvergenceResult};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Polls a count until it reaches the expected value or the budget runs out.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceVerifier {
    budget: Duration,
    poll_interval: Duration,
}

impl ConvergenceVerifier {
    pub fn new(budget: Duration, poll_interval: Duration) -> Self {
        Self {
            budget,
            poll_interval,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Poll `read_count` until it reports at least `expected`.
    ///
    /// Stops on the first read error, on the first count `>= expected`, or
    /// once the budget has elapsed. Only an exact match converges; a count
    /// above `expected` ends as [`ConvergenceOutcome::Overshoot`].
    pub async fn verify<F, Fut>(&self, expected: u64, mut read_count: F) -> ConvergenceResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<u64, ClusterError>>,
    {
        let started = Instant::now();
        let mut observed = 0;
        let mut polls = 0;

        let outcome = loop {
            polls += 1;
            match read_count().await {
                Ok(count) => observed = count,
                Err(e) => {
                    warn!(error = %e, observed, expected, "count read failed");
                    break ConvergenceOutcome::ReadFailed(e.to_string());
                }
            }

            if observed == expected {
                break ConvergenceOutcome::Exact;
            }
            if observed > expected {
                warn!(observed, expected, "downstream count overshot");
                break ConvergenceOutcome::Overshoot;
            }
            if started.elapsed() >= self.budget {
                break ConvergenceOutcome::TimedOut;
            }

            debug!(observed, expected, polls, "not converged yet");
            tokio::time::sleep(self.poll_interval).await;
        };

        let elapsed = started.elapsed();
        info!(
            observed,
            expected,
            polls,
            elapsed_ms = elapsed.as_millis() as u64,
            outcome = ?outcome,
            "verification finished"
        );

        ConvergenceResult {
            observed,
            expected,
            elapsed,
            polls,
            outcome,
        }
    }
}
