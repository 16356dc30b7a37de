//! Queue consumer loop.
//!
//! `consume` spawns a task that claims jobs from one queue and runs them on a
//! handler, with at most `concurrency` jobs in flight. Each job runs in its
//! own task so a slow job (a simulated settlement delay, a webhook timeout)
//! never blocks its siblings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Job, JobQueue, QueueName};
use crate::error::JobError;

/// Processes one job. Returning an error marks the job failed for good.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

/// Consumer tuning.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Maximum jobs of this queue in flight at once
    pub concurrency: usize,

    /// Sleep between claims when the queue is empty
    pub poll_interval: Duration,

    /// Age after which an `active` job is considered abandoned
    pub visibility_timeout: Duration,

    /// How long `completed` jobs are kept before being pruned
    pub completed_retention: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_millis(500),
            visibility_timeout: Duration::from_secs(60),
            completed_retention: Duration::from_secs(3600),
        }
    }
}

/// Start consuming `queue_name` until `shutdown` is cancelled.
///
/// On shutdown the loop stops claiming and waits for in-flight jobs to
/// finish before the returned handle resolves.
pub fn consume(
    queue: Arc<dyn JobQueue>,
    queue_name: QueueName,
    handler: Arc<dyn JobHandler>,
    config: ConsumerConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let consumer = Consumer {
        queue,
        queue_name,
        handler,
        config,
        shutdown,
    };
    tokio::spawn(consumer.run())
}

struct Consumer {
    queue: Arc<dyn JobQueue>,
    queue_name: QueueName,
    handler: Arc<dyn JobHandler>,
    config: ConsumerConfig,
    shutdown: CancellationToken,
}

impl Consumer {
    async fn run(self) {
        info!(
            queue = %self.queue_name,
            concurrency = self.config.concurrency,
            "consumer started"
        );

        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut in_flight = JoinSet::new();
        // first tick fires immediately, recovering jobs left active by a crash
        let mut maintenance = tokio::time::interval(
            (self.config.visibility_timeout / 2).max(Duration::from_millis(100)),
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                _ = maintenance.tick() => self.maintain().await,

                permit = permits.clone().acquire_owned() => {
                    let Ok(permit) = permit else { break };

                    match self.queue.claim(self.queue_name).await {
                        Ok(Some(job)) => {
                            let queue = self.queue.clone();
                            let handler = self.handler.clone();
                            in_flight.spawn(async move {
                                process(queue, handler, job).await;
                                drop(permit);
                            });
                        }
                        Ok(None) => {
                            drop(permit);
                            self.idle().await;
                        }
                        Err(err) => {
                            drop(permit);
                            error!(queue = %self.queue_name, error = %err, "failed to claim job");
                            self.idle().await;
                        }
                    }
                }
            }

            while let Some(result) = in_flight.try_join_next() {
                if let Err(err) = result {
                    error!(queue = %self.queue_name, error = %err, "job task panicked");
                }
            }
        }

        info!(
            queue = %self.queue_name,
            in_flight = in_flight.len(),
            "consumer stopping, draining in-flight jobs"
        );
        while let Some(result) = in_flight.join_next().await {
            if let Err(err) = result {
                error!(queue = %self.queue_name, error = %err, "job task panicked");
            }
        }
    }

    async fn idle(&self) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.config.poll_interval) => {}
        }
    }

    /// Recover stalled jobs and prune old completed ones.
    async fn maintain(&self) {
        match self
            .queue
            .requeue_stalled(self.queue_name, self.config.visibility_timeout)
            .await
        {
            Ok(0) => {}
            Ok(recovered) => {
                warn!(queue = %self.queue_name, recovered, "requeued stalled jobs")
            }
            Err(err) => {
                error!(queue = %self.queue_name, error = %err, "stalled job check failed")
            }
        }

        match self
            .queue
            .prune_completed(self.queue_name, self.config.completed_retention)
            .await
        {
            Ok(0) => {}
            Ok(pruned) => debug!(queue = %self.queue_name, pruned, "pruned completed jobs"),
            Err(err) => {
                error!(queue = %self.queue_name, error = %err, "completed job pruning failed")
            }
        }
    }
}

async fn process(queue: Arc<dyn JobQueue>, handler: Arc<dyn JobHandler>, job: Job) {
    debug!(queue = %job.queue, job_id = %job.id, "processing job");

    match handler.handle(&job).await {
        Ok(()) => {
            if let Err(err) = queue.complete(job.id).await {
                error!(job_id = %job.id, error = %err, "failed to mark job completed");
            }
        }
        Err(err) => {
            error!(queue = %job.queue, job_id = %job.id, error = %err, "job failed");
            if let Err(mark_err) = queue.fail(job.id, &err.to_string()).await {
                error!(job_id = %job.id, error = %mark_err, "failed to mark job failed");
            }
        }
    }
}
