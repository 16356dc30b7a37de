//! In-memory job queue.
//!
//! Same semantics as the PostgreSQL queue (delays, claiming, stalled-job
//! recovery, pruning of completed jobs) without persistence. Used by the test suite and by
//! database-less local runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{EnqueueOptions, Job, JobCounts, JobQueue, JobStatus, QueueError, QueueName};

/// Thread-safe in-memory queue.
///
/// Clones share the same underlying jobs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryJobQueue {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: Vec<Job>,
    /// Completed jobs removed by `prune_completed`, per queue
    pruned_completed: HashMap<QueueName, i64>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the retained jobs of `queue`, in enqueue order.
    pub async fn jobs(&self, queue: QueueName) -> Vec<Job> {
        let inner = self.inner.lock().await;
        inner
            .jobs
            .iter()
            .filter(|job| job.queue == queue.as_str())
            .cloned()
            .collect()
    }
}

fn to_time_delta(duration: Duration) -> Result<TimeDelta, QueueError> {
    TimeDelta::from_std(duration).map_err(|_| QueueError::InvalidDelay(duration))
}

fn set_status(jobs: &mut [Job], job_id: Uuid, status: JobStatus, error: Option<&str>) {
    if let Some(job) = jobs.iter_mut().find(|job| job.id == job_id) {
        job.status = status.as_str().to_string();
        job.last_error = error.map(str::to_string);
        job.updated_at = Utc::now();
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<Uuid, QueueError> {
        let delay = to_time_delta(options.delay.unwrap_or(Duration::ZERO))?;
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            queue: queue.as_str().to_string(),
            payload,
            status: JobStatus::Waiting.as_str().to_string(),
            run_at: now + delay,
            started_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        let id = job.id;

        self.inner.lock().await.jobs.push(job);
        Ok(id)
    }

    async fn claim(&self, queue: QueueName) -> Result<Option<Job>, QueueError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        let next = inner
            .jobs
            .iter_mut()
            .filter(|job| {
                job.queue == queue.as_str()
                    && job.status == JobStatus::Waiting.as_str()
                    && job.run_at <= now
            })
            .min_by_key(|job| (job.run_at, job.created_at));

        Ok(next.map(|job| {
            job.status = JobStatus::Active.as_str().to_string();
            job.started_at = Some(now);
            job.updated_at = now;
            job.clone()
        }))
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        set_status(&mut inner.jobs, job_id, JobStatus::Completed, None);
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, reason: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        set_status(&mut inner.jobs, job_id, JobStatus::Failed, Some(reason));
        Ok(())
    }

    async fn get_counts(&self, queue: QueueName) -> Result<JobCounts, QueueError> {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        let mut counts = JobCounts {
            completed: inner.pruned_completed.get(&queue).copied().unwrap_or(0),
            ..JobCounts::default()
        };

        for job in inner.jobs.iter().filter(|job| job.queue == queue.as_str()) {
            match job.status.as_str() {
                "waiting" if job.run_at <= now => counts.waiting += 1,
                "waiting" => counts.delayed += 1,
                "active" => counts.active += 1,
                "completed" => counts.completed += 1,
                "failed" => counts.failed += 1,
                _ => {}
            }
        }

        Ok(counts)
    }

    async fn prune_completed(
        &self,
        queue: QueueName,
        older_than: Duration,
    ) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - to_time_delta(older_than)?;
        let mut inner = self.inner.lock().await;

        let before = inner.jobs.len();
        inner.jobs.retain(|job| {
            !(job.queue == queue.as_str()
                && job.status == JobStatus::Completed.as_str()
                && job.updated_at <= cutoff)
        });
        let pruned = before - inner.jobs.len();

        *inner.pruned_completed.entry(queue).or_default() += pruned as i64;
        Ok(pruned as u64)
    }

    async fn requeue_stalled(
        &self,
        queue: QueueName,
        visibility_timeout: Duration,
    ) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - to_time_delta(visibility_timeout)?;
        let mut inner = self.inner.lock().await;
        let mut recovered = 0;

        for job in inner.jobs.iter_mut().filter(|job| {
            job.queue == queue.as_str()
                && job.status == JobStatus::Active.as_str()
                && job.started_at.is_some_and(|started| started < cutoff)
        }) {
            job.status = JobStatus::Waiting.as_str().to_string();
            job.started_at = None;
            job.updated_at = Utc::now();
            recovered += 1;
        }

        Ok(recovered)
    }
}
