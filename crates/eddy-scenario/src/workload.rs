//! Workload generator: writes sequential keys until told to stop.
//!
//! The generator owns its counter. The executor reads the final count only
//! through [`WorkloadHandle::join`], so there is no shared mutable state
//! between the generator and the rest of the run.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use eddy_cluster::PrimaryNode;
use eddy_types::{WorkloadSpec, workload_key};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::ScenarioError;

/// Issues `key_<n>` writes against one source collection.
pub struct WorkloadGenerator {
    target: Arc<dyn PrimaryNode>,
    collection: String,
    spec: WorkloadSpec,
    grace: Duration,
}

impl WorkloadGenerator {
    pub fn new(
        target: Arc<dyn PrimaryNode>,
        collection: impl Into<String>,
        spec: WorkloadSpec,
        grace: Duration,
    ) -> Self {
        Self {
            target,
            collection: collection.into(),
            spec,
            grace,
        }
    }

    /// Spawn the write loop.
    ///
    /// The loop stops when `stop` fires or its sender is dropped, waits the
    /// grace period once, and resolves to the number of acknowledged writes.
    /// The stop check happens before each write; a write already issued is
    /// always awaited.
    pub fn start(self, stop: oneshot::Receiver<()>) -> WorkloadHandle {
        WorkloadHandle(tokio::spawn(self.run(stop)))
    }

    async fn run(self, mut stop: oneshot::Receiver<()>) -> Result<u64, ScenarioError> {
        let value = payload(self.spec.item_size);
        let mut acknowledged: u64 = 0;

        info!(collection = %self.collection, "workload started");

        loop {
            match stop.try_recv() {
                Ok(()) | Err(TryRecvError::Closed) => {
                    debug!(acknowledged, "stop signal received, waiting grace period");
                    tokio::time::sleep(self.grace).await;
                    info!(collection = %self.collection, acknowledged, "workload stopped");
                    return Ok(acknowledged);
                }
                Err(TryRecvError::Empty) => {}
            }

            if let Some(cap) = self.spec.item_count
                && acknowledged >= cap
            {
                info!(collection = %self.collection, acknowledged, "workload reached item count");
                return Ok(acknowledged);
            }

            let key = workload_key(acknowledged);
            self.target
                .write(&self.collection, &key, value.clone())
                .await
                .map_err(|source| ScenarioError::Workload {
                    acknowledged,
                    source,
                })?;
            acknowledged += 1;

            tokio::task::yield_now().await;
        }
    }
}

/// Join handle of a running generator.
pub struct WorkloadHandle(JoinHandle<Result<u64, ScenarioError>>);

impl WorkloadHandle {
    /// Wait for the final acknowledged-write count.
    pub async fn join(self) -> Result<u64, ScenarioError> {
        self.0.await.map_err(|e| ScenarioError::Task {
            task: "workload",
            reason: e.to_string(),
        })?
    }
}

/// Deterministic printable value of `size` bytes.
pub fn payload(size: usize) -> Bytes {
    (0..size).map(|i| b'a' + (i % 26) as u8).collect::<Vec<u8>>().into()
}
