//! Durable, time-ordered job store backed by PostgreSQL.
//!
//! Every mutation is a single statement or a short transaction so that N
//! webhook handlers and M worker ticks can hit the store concurrently.
//! Claiming uses `FOR UPDATE SKIP LOCKED`: two overlapping claimers never
//! receive the same job, and a claimer that loses the race simply gets
//! fewer rows back.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use apteka_common::error::AppError;
use apteka_common::types::{Job, NotificationPayload, QueueStats};

/// PostgreSQL-backed job store shared by the scheduler, the delivery
/// worker, and the introspection endpoints.
#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending job due at `ready_at`. Returns the new job ID.
    ///
    /// `ready_at` is immutable once set: rescheduling means cancelling via
    /// the correlation key and enqueueing a fresh job.
    pub async fn enqueue(
        &self,
        queue_name: &str,
        payload: &NotificationPayload,
        ready_at: DateTime<Utc>,
        correlation_key: Option<&str>,
    ) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_value(payload)
            .map_err(|e| AppError::Internal(format!("Failed to encode job payload: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, queue_name, payload, ready_at, correlation_key, attempts, status)
            VALUES ($1, $2, $3, $4, $5, 0, 'pending')
            "#,
        )
        .bind(id)
        .bind(queue_name)
        .bind(&payload)
        .bind(ready_at)
        .bind(correlation_key)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            job_id = %id,
            queue = queue_name,
            ready_at = %ready_at,
            correlation_key,
            "Job enqueued"
        );

        Ok(id)
    }

    /// Atomically claim up to `limit` due jobs, earliest deadline first
    /// (ties broken by insertion order).
    ///
    /// Jobs come back with `status = claimed`; the caller must resolve each
    /// one via `complete` or `fail`.
    pub async fn claim_due(
        &self,
        queue_name: &str,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Job>, AppError> {
        let mut tx = self.pool.begin().await?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM jobs
            WHERE queue_name = $1 AND status = 'pending' AND ready_at <= $2
            ORDER BY ready_at ASC, created_at ASC
            LIMIT $3
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(queue_name)
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await?;

        if ids.is_empty() {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let mut jobs: Vec<Job> = sqlx::query_as(
            r#"
            UPDATE jobs SET status = 'claimed', claimed_at = $2
            WHERE id = ANY($1)
            RETURNING id, queue_name, payload, ready_at, correlation_key, attempts, status, created_at
            "#,
        )
        .bind(&ids)
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        // UPDATE .. RETURNING has no ordering guarantee; restore the
        // deadline order the SELECT established.
        jobs.sort_by(|a, b| (a.ready_at, a.created_at).cmp(&(b.ready_at, b.created_at)));

        tracing::debug!(queue = queue_name, claimed = jobs.len(), "Claimed due jobs");
        Ok(jobs)
    }

    /// Mark a claimed job as successfully delivered.
    pub async fn complete(&self, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE jobs SET status = 'done' WHERE id = $1 AND status = 'claimed'")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a delivery failure.
    ///
    /// With `Some(retry_after)` the job goes back to pending with its
    /// attempt counter bumped and a new ready time; with `None` it is
    /// failed permanently and never claimed again.
    pub async fn fail(
        &self,
        job_id: Uuid,
        retry_after: Option<Duration>,
    ) -> Result<(), AppError> {
        match retry_after {
            Some(delay) => {
                let next_ready = Utc::now()
                    + chrono::Duration::from_std(delay)
                        .map_err(|e| AppError::Internal(format!("Invalid retry delay: {}", e)))?;

                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'pending', attempts = attempts + 1, ready_at = $2,
                        claimed_at = NULL
                    WHERE id = $1 AND status = 'claimed'
                    "#,
                )
                .bind(job_id)
                .bind(next_ready)
                .execute(&self.pool)
                .await?;

                tracing::debug!(job_id = %job_id, next_ready = %next_ready, "Job rescheduled");
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'failed', attempts = attempts + 1
                    WHERE id = $1 AND status = 'claimed'
                    "#,
                )
                .bind(job_id)
                .execute(&self.pool)
                .await?;

                tracing::warn!(job_id = %job_id, "Job failed permanently");
            }
        }
        Ok(())
    }

    /// Remove all pending jobs in a queue matching a correlation key.
    ///
    /// Jobs already claimed are left alone: an in-flight send is allowed to
    /// finish even if a cancellation races it.
    pub async fn cancel_by_correlation(
        &self,
        queue_name: &str,
        correlation_key: &str,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE queue_name = $1 AND correlation_key = $2 AND status = 'pending'",
        )
        .bind(queue_name)
        .bind(correlation_key)
        .execute(&self.pool)
        .await?;

        let cancelled = result.rows_affected();
        if cancelled > 0 {
            tracing::info!(queue = queue_name, correlation_key, cancelled, "Jobs cancelled");
        }
        Ok(cancelled)
    }

    /// Return claimed jobs whose claim is older than `claimed_before` to
    /// pending, keeping their original `ready_at` so they are due at once.
    ///
    /// A claim goes stale when the worker crashed between claiming and
    /// resolving, or when the outcome write itself failed. Attempts are
    /// not bumped: the send outcome is unknown, so the job gets a full
    /// redelivery rather than a step down the backoff schedule.
    pub async fn release_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', claimed_at = NULL
            WHERE status = 'claimed' AND claimed_at < $1
            "#,
        )
        .bind(claimed_before)
        .execute(&self.pool)
        .await?;

        let released = result.rows_affected();
        if released > 0 {
            tracing::warn!(released, "Released stale claimed jobs back to pending");
        }
        Ok(released)
    }

    /// Pending count and earliest deadline for a queue.
    pub async fn stats(&self, queue_name: &str) -> Result<QueueStats, AppError> {
        let row: (i64, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            SELECT COUNT(*), MIN(ready_at)
            FROM jobs
            WHERE queue_name = $1 AND status = 'pending'
            "#,
        )
        .bind(queue_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueStats {
            pending_count: row.0,
            oldest_ready_at: row.1,
        })
    }

    /// Drop every pending job in a queue. Returns the number removed.
    /// Claimed jobs in flight are not touched.
    pub async fn clear(&self, queue_name: &str) -> Result<u64, AppError> {
        let result =
            sqlx::query("DELETE FROM jobs WHERE queue_name = $1 AND status = 'pending'")
                .bind(queue_name)
                .execute(&self.pool)
                .await?;

        let cleared = result.rows_affected();
        tracing::info!(queue = queue_name, cleared, "Queue cleared");
        Ok(cleared)
    }

    /// Delete done and permanently failed jobs older than `before`.
    /// Keeps the jobs table from growing without bound.
    pub async fn purge_resolved(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status IN ('done', 'failed') AND created_at < $1",
        )
        .bind(before)
        .execute(&self.pool)
        .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            tracing::debug!(purged, "Purged resolved jobs");
        }
        Ok(purged)
    }

    /// Fetch a job by ID regardless of status. Used by tests and introspection.
    pub async fn get(&self, job_id: Uuid) -> Result<Option<Job>, AppError> {
        let job: Option<Job> = sqlx::query_as(
            r#"
            SELECT id, queue_name, payload, ready_at, correlation_key, attempts, status, created_at
            FROM jobs WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore").finish_non_exhaustive()
    }
}
