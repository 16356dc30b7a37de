//! Durable named work queues.
//!
//! Jobs are persisted rows that become visible to consumers immediately or
//! after a delay. Delivery is at-least-once: a job claimed by a consumer that
//! disappears is returned to `waiting` once its visibility timeout elapses.
//!
//! - `postgres`: `jobs` table, claimed with `FOR UPDATE SKIP LOCKED`
//! - `memory`: process-local queue for tests and database-less runs
//! - `consumer`: polling loop running a handler with bounded concurrency

pub mod consumer;
pub mod memory;
pub mod postgres;

use std::fmt;
use std::ops::AddAssign;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

pub use consumer::{ConsumerConfig, JobHandler, consume};
pub use memory::InMemoryJobQueue;
pub use postgres::PgJobQueue;

/// The three work queues of the back office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Payment,
    Refund,
    Webhook,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::Payment, QueueName::Refund, QueueName::Webhook];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Payment => "payment",
            QueueName::Refund => "refund",
            QueueName::Webhook => "webhook",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle bucket of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Options accepted by `JobQueue::enqueue`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Earliest visibility, relative to the enqueue time.
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn immediate() -> Self {
        Self::default()
    }

    pub fn delayed(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }

    pub fn delay_ms(delay_ms: u64) -> Self {
        Self::delayed(Duration::from_millis(delay_ms))
    }
}

/// A persisted unit of work.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub queue: String,
    pub payload: serde_json::Value,
    pub status: String,

    /// Not visible to consumers before this instant
    pub run_at: DateTime<Utc>,

    /// Set when a consumer claims the job
    pub started_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Decode the payload into the job type of this queue.
    pub fn decode<P: JobPayload>(&self) -> Result<P, serde_json::Error> {
        P::deserialize(&self.payload)
    }
}

/// Job counts per lifecycle bucket.
///
/// `waiting` only counts jobs that are already visible; jobs scheduled for
/// later are reported as `delayed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub waiting: i64,
    pub delayed: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

impl AddAssign for JobCounts {
    fn add_assign(&mut self, other: Self) {
        self.waiting += other.waiting;
        self.delayed += other.delayed;
        self.active += other.active;
        self.completed += other.completed;
        self.failed += other.failed;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid delay: {0:?}")]
    InvalidDelay(Duration),
}

/// Persistent work queue.
///
/// Implementations must keep jobs across restarts (except the in-memory
/// one) and only hand out a `waiting` job whose `run_at` has passed.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Persist a job, visible now or after `options.delay`.
    async fn enqueue(
        &self,
        queue: QueueName,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<Uuid, QueueError>;

    /// Atomically move the next visible job to `active` and return it.
    async fn claim(&self, queue: QueueName) -> Result<Option<Job>, QueueError>;

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Mark a job `failed`. Failed jobs are kept for inspection and never
    /// redelivered.
    async fn fail(&self, job_id: Uuid, reason: &str) -> Result<(), QueueError>;

    /// Counts per bucket. `completed` includes jobs already pruned.
    async fn get_counts(&self, queue: QueueName) -> Result<JobCounts, QueueError>;

    /// Delete `completed` jobs finished more than `older_than` ago, adding
    /// them to the queue's completed tally. Returns the number deleted.
    async fn prune_completed(&self, queue: QueueName, older_than: Duration)
        -> Result<u64, QueueError>;

    /// Return `active` jobs claimed longer than `visibility_timeout` ago to
    /// `waiting`. Returns the number of jobs recovered.
    async fn requeue_stalled(
        &self,
        queue: QueueName,
        visibility_timeout: Duration,
    ) -> Result<u64, QueueError>;
}

/// A typed payload bound to its queue.
pub trait JobPayload: Serialize + DeserializeOwned + Send + Sync {
    const QUEUE: QueueName;
}

/// Serialize `payload` and enqueue it on its queue.
pub async fn dispatch<P: JobPayload>(
    queue: &dyn JobQueue,
    payload: &P,
    options: EnqueueOptions,
) -> Result<Uuid, QueueError> {
    let value = serde_json::to_value(payload)?;
    queue.enqueue(P::QUEUE, value, options).await
}
