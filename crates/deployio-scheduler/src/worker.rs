//! Worker that consumes build messages one at a time.

use deployio_core::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::pipeline::{BuildPipeline, JobOutcome};
use crate::queue::{BuildQueue, Delivery};

const CLAIM_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A worker that claims messages and runs them through the pipeline.
pub struct Worker {
    id: String,
    queue: Arc<dyn BuildQueue>,
    pipeline: Arc<BuildPipeline>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<dyn BuildQueue>,
        pipeline: Arc<BuildPipeline>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            pipeline,
            poll_interval,
        }
    }

    /// Run the worker loop until `shutdown` resolves. A job in progress is
    /// always finished first.
    ///
    /// Returns an error only when a job's running state could not be
    /// recorded.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!(worker_id = %self.id, "Starting worker");
        tokio::pin!(shutdown);

        loop {
            let claimed = tokio::select! {
                _ = &mut shutdown => break,
                claimed = self.queue.claim(&self.id) => claimed,
            };

            let idle = match claimed {
                Ok(Some(delivery)) => {
                    self.process(delivery).await?;
                    continue;
                }
                Ok(None) => self.poll_interval,
                Err(e) => {
                    warn!(worker_id = %self.id, error = %e, "Failed to claim message");
                    CLAIM_RETRY_DELAY
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = sleep(idle) => {}
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
        Ok(())
    }

    /// Acknowledge and handle one message.
    pub async fn process(&self, delivery: Delivery) -> Result<JobOutcome> {
        info!(worker_id = %self.id, message_id = delivery.id, "Claimed message");

        // Acked up front: a crash mid-build leaves the job in `running`.
        if let Err(e) = self.queue.ack(&delivery).await {
            warn!(message_id = delivery.id, error = %e, "Failed to acknowledge message");
        }

        let outcome = self.pipeline.handle(&delivery.payload).await.map_err(|e| {
            error!(worker_id = %self.id, message_id = delivery.id, error = %e, "Halting worker");
            e
        })?;

        match &outcome {
            JobOutcome::Dropped => info!(message_id = delivery.id, "Message dropped"),
            JobOutcome::Skipped(build_id) => info!(build_id = %build_id, "Build skipped"),
            JobOutcome::Succeeded {
                build_id,
                deployment,
            } => info!(
                build_id = %build_id,
                deployment_id = deployment.id,
                "Build deployed"
            ),
            JobOutcome::Failed { build_id, .. } => info!(build_id = %build_id, "Build failed"),
        }

        Ok(outcome)
    }
}
