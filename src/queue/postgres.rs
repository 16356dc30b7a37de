//! PostgreSQL-backed job queue.
//!
//! Jobs live in the `jobs` table. Consumers claim with
//! `FOR UPDATE SKIP LOCKED`, so concurrent consumers never receive the same
//! row, and the row lock is released as soon as the claim commits.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::{EnqueueOptions, Job, JobCounts, JobQueue, QueueError, QueueName};
use crate::db::DbPool;

#[derive(Debug, Clone)]
pub struct PgJobQueue {
    pool: DbPool,
}

impl PgJobQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CountRow {
    waiting: i64,
    delayed: i64,
    active: i64,
    completed: i64,
    failed: i64,
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<Uuid, QueueError> {
        let delay_secs = options.delay.unwrap_or(Duration::ZERO).as_secs_f64();

        // run_at uses the database clock, the same one `claim` compares against
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO jobs (id, queue, payload, status, run_at)
            VALUES ($1, $2, $3, 'waiting', NOW() + make_interval(secs => $4))
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(queue.as_str())
        .bind(&payload)
        .bind(delay_secs)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(%queue, job_id = %id, delay_secs, "job enqueued");
        Ok(id)
    }

    async fn claim(&self, queue: QueueName) -> Result<Option<Job>, QueueError> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'active',
                started_at = NOW(),
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM jobs
                WHERE queue = $1 AND status = 'waiting' AND run_at <= NOW()
                ORDER BY run_at, created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(queue.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', last_error = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail(&self, job_id: Uuid, reason: &str) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE jobs SET status = 'failed', last_error = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_counts(&self, queue: QueueName) -> Result<JobCounts, QueueError> {
        let row = sqlx::query_as::<_, CountRow>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'waiting' AND run_at <= NOW()) AS waiting,
                COUNT(*) FILTER (WHERE status = 'waiting' AND run_at > NOW()) AS delayed,
                COUNT(*) FILTER (WHERE status = 'active') AS active,
                COUNT(*) FILTER (WHERE status = 'completed')
                    + COALESCE((SELECT completed_pruned FROM job_stats WHERE queue = $1), 0)
                    AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM jobs
            WHERE queue = $1
            "#,
        )
        .bind(queue.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(JobCounts {
            waiting: row.waiting,
            delayed: row.delayed,
            active: row.active,
            completed: row.completed,
            failed: row.failed,
        })
    }

    async fn prune_completed(
        &self,
        queue: QueueName,
        older_than: Duration,
    ) -> Result<u64, QueueError> {
        // the delete and the tally commit together as one statement
        let pruned = sqlx::query_scalar::<_, i64>(
            r#"
            WITH pruned AS (
                DELETE FROM jobs
                WHERE queue = $1
                  AND status = 'completed'
                  AND updated_at <= NOW() - make_interval(secs => $2)
                RETURNING id
            ), tally AS (
                INSERT INTO job_stats (queue, completed_pruned)
                SELECT $1, COUNT(*) FROM pruned
                ON CONFLICT (queue)
                DO UPDATE SET completed_pruned = job_stats.completed_pruned + EXCLUDED.completed_pruned
            )
            SELECT COUNT(*) FROM pruned
            "#,
        )
        .bind(queue.as_str())
        .bind(older_than.as_secs_f64())
        .fetch_one(&self.pool)
        .await?;

        Ok(u64::try_from(pruned).unwrap_or(0))
    }

    async fn requeue_stalled(
        &self,
        queue: QueueName,
        visibility_timeout: Duration,
    ) -> Result<u64, QueueError> {
        let recovered = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'waiting',
                started_at = NULL,
                updated_at = NOW()
            WHERE queue = $1
              AND status = 'active'
              AND started_at < NOW() - make_interval(secs => $2)
            "#,
        )
        .bind(queue.as_str())
        .bind(visibility_timeout.as_secs_f64())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(recovered)
    }
}
