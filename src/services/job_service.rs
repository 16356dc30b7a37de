//! Queue status aggregation for the job status endpoint.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::queue::{JobCounts, JobQueue, QueueError, QueueName};

/// Whether the settlement and delivery workers run in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Consumers run inside this process
    Running,
    /// Consumers run in a separate worker process
    External,
}

/// Summed counts over every queue plus the per-queue breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusResponse {
    pub pending: i64,
    pub delayed: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub worker_status: WorkerStatus,
    pub queues: BTreeMap<&'static str, JobCounts>,
}

pub async fn job_status(
    queue: &dyn JobQueue,
    worker_status: WorkerStatus,
) -> Result<JobStatusResponse, QueueError> {
    let mut total = JobCounts::default();
    let mut queues = BTreeMap::new();

    for name in QueueName::ALL {
        let counts = queue.get_counts(name).await?;
        total += counts;
        queues.insert(name.as_str(), counts);
    }

    Ok(JobStatusResponse {
        pending: total.waiting,
        delayed: total.delayed,
        processing: total.active,
        completed: total.completed,
        failed: total.failed,
        worker_status,
        queues,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::queue::{EnqueueOptions, InMemoryJobQueue};

    #[tokio::test]
    async fn sums_counts_across_queues() {
        let queue = InMemoryJobQueue::new();
        queue
            .enqueue(QueueName::Payment, json!({}), EnqueueOptions::immediate())
            .await
            .unwrap();
        queue
            .enqueue(QueueName::Webhook, json!({}), EnqueueOptions::immediate())
            .await
            .unwrap();
        queue
            .enqueue(QueueName::Webhook, json!({}), EnqueueOptions::delay_ms(60_000))
            .await
            .unwrap();
        let job = queue.claim(QueueName::Payment).await.unwrap().unwrap();
        queue.complete(job.id).await.unwrap();

        let status = job_status(&queue, WorkerStatus::Running).await.unwrap();
        assert_eq!(status.pending, 1);
        assert_eq!(status.delayed, 1);
        assert_eq!(status.completed, 1);
        assert_eq!(status.processing, 0);
        assert_eq!(status.queues["webhook"].waiting, 1);

        let body = serde_json::to_value(&status).unwrap();
        assert_eq!(body["worker_status"], "running");
    }
}
