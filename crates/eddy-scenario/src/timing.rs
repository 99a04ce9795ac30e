//! Fixed waits and the verification budget of a run.

use std::time::Duration;

/// Every sleep the executor performs, plus the verifier's budget.
///
/// Only the verifier is bounded by wall-clock time; the rest are plain
/// sleeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Wait after the topology mutation before the workload is stopped.
    pub perturbation_settle: Duration,
    /// Total time the verifier may poll.
    pub verify_budget: Duration,
    /// Sleep between count reads.
    pub poll_interval: Duration,
    /// Wait after the stop signal before the final count is emitted.
    pub workload_grace: Duration,
    /// Wait between creating a source collection and connecting to it.
    pub collection_settle: Duration,
    /// Wait at the end of setup.
    pub setup_settle: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            perturbation_settle: Duration::from_secs(60),
            verify_budget: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
            workload_grace: Duration::from_secs(1),
            collection_settle: Duration::from_secs(1),
            setup_settle: Duration::from_secs(30),
        }
    }
}

impl Timing {
    /// Short waits for tests running against simulated clusters.
    pub fn test_config() -> Self {
        Self {
            perturbation_settle: Duration::from_millis(50),
            verify_budget: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            workload_grace: Duration::from_millis(10),
            collection_settle: Duration::ZERO,
            setup_settle: Duration::ZERO,
        }
    }
}
