//! PostgreSQL implementation of JobQueue
//!
//! - Concurrent claiming with `FOR UPDATE SKIP LOCKED`
//! - Retry bookkeeping (attempt counter, visibility delay) in the job row

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::store::*;
use crate::reliability::RetryPolicy;

/// PostgreSQL implementation of JobQueue
///
/// # Example
///
/// ```ignore
/// use pushcast_durable::PostgresJobQueue;
///
/// let queue = PostgresJobQueue::connect("postgres://localhost/pushcast").await?;
/// queue.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    /// Create a new queue with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect lazily; reachability is checked by [`JobQueue::ping`]
    pub fn connect_lazy(database_url: &str) -> Result<Self, QueueError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(2))
            .connect_lazy(database_url)
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the queue table
    pub async fn migrate(&self) -> Result<(), QueueError> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&self.pool)
            .await
            .map_err(|e| QueueError::Database(e.to_string()))
    }
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> QueueError {
    move |e| {
        error!("{}: {}", context, e);
        QueueError::Database(e.to_string())
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    #[instrument(skip(self, job), fields(job_type = %job.job_type))]
    async fn enqueue(&self, job: JobDefinition) -> Result<Uuid, QueueError> {
        let ids = self.enqueue_bulk(vec![job]).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| QueueError::Database("insert returned no id".to_string()))
    }

    #[instrument(skip(self, jobs), fields(count = jobs.len()))]
    async fn enqueue_bulk(&self, jobs: Vec<JobDefinition>) -> Result<Vec<Uuid>, QueueError> {
        if jobs.is_empty() {
            return Ok(vec![]);
        }

        let mut ids = Vec::with_capacity(jobs.len());
        let mut job_types = Vec::with_capacity(jobs.len());
        let mut payloads = Vec::with_capacity(jobs.len());
        let mut policies = Vec::with_capacity(jobs.len());
        let mut max_attempts = Vec::with_capacity(jobs.len());

        for job in jobs {
            ids.push(Uuid::now_v7());
            max_attempts.push(job.retry_policy.max_attempts as i32);
            policies.push(serde_json::to_value(&job.retry_policy)?);
            job_types.push(job.job_type);
            payloads.push(job.payload);
        }

        sqlx::query(
            r#"
            INSERT INTO durable_job_queue (id, job_type, payload, retry_policy, max_attempts)
            SELECT * FROM UNNEST($1::uuid[], $2::text[], $3::jsonb[], $4::jsonb[], $5::int4[])
            "#,
        )
        .bind(&ids)
        .bind(&job_types)
        .bind(&payloads)
        .bind(&policies)
        .bind(&max_attempts)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to enqueue jobs"))?;

        debug!(count = ids.len(), "enqueued jobs");
        Ok(ids)
    }

    #[instrument(skip(self, job_types))]
    async fn claim(
        &self,
        worker_id: &str,
        job_types: &[String],
        max_jobs: usize,
    ) -> Result<Vec<ClaimedJob>, QueueError> {
        if job_types.is_empty() || max_jobs == 0 {
            return Ok(vec![]);
        }

        let rows = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT id
                FROM durable_job_queue
                WHERE status = 'pending'
                  AND job_type = ANY($1)
                  AND visible_at <= NOW()
                ORDER BY visible_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE durable_job_queue q
            SET status = 'claimed',
                claimed_by = $3,
                claimed_at = NOW(),
                attempt = attempt + 1
            FROM claimable c
            WHERE q.id = c.id
            RETURNING q.id, q.job_type, q.payload, q.attempt, q.max_attempts
            "#,
        )
        .bind(job_types)
        .bind(max_jobs as i64)
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to claim jobs"))?;

        let claimed: Vec<ClaimedJob> = rows
            .into_iter()
            .map(|row| ClaimedJob {
                id: row.get("id"),
                job_type: row.get("job_type"),
                payload: row.get("payload"),
                attempt: row.get::<i32, _>("attempt") as u32,
                max_attempts: row.get::<i32, _>("max_attempts") as u32,
            })
            .collect();

        if !claimed.is_empty() {
            debug!(worker_id, count = claimed.len(), "claimed jobs");
        }

        Ok(claimed)
    }

    #[instrument(skip(self))]
    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        sqlx::query("UPDATE durable_job_queue SET status = 'completed' WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to complete job"))?;

        debug!(%job_id, "completed job");
        Ok(())
    }

    #[instrument(skip(self, error))]
    async fn fail(&self, job_id: Uuid, error: &JobError) -> Result<JobFailureOutcome, QueueError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let row = sqlx::query(
            r#"
            SELECT attempt, retry_policy
            FROM durable_job_queue
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to load job"))?
        .ok_or(QueueError::JobNotFound(job_id))?;

        let attempt = row.get::<i32, _>("attempt") as u32;
        let policy: RetryPolicy = serde_json::from_value(row.get("retry_policy"))?;
        let message = error.to_string();

        let outcome = if policy.has_attempts_remaining(attempt)
            && policy.should_retry(error.error_type.as_deref())
        {
            let next_attempt = attempt + 1;
            let delay = policy.delay_for_attempt(next_attempt);
            let visible_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();

            sqlx::query(
                r#"
                UPDATE durable_job_queue
                SET status = 'pending',
                    claimed_by = NULL,
                    claimed_at = NULL,
                    last_error = $2,
                    visible_at = $3
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(&message)
            .bind(visible_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to requeue job"))?;

            debug!(%job_id, next_attempt, "job will retry");
            JobFailureOutcome::WillRetry {
                next_attempt,
                delay,
            }
        } else {
            sqlx::query("UPDATE durable_job_queue SET status = 'dead', last_error = $2 WHERE id = $1")
                .bind(job_id)
                .bind(&message)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to mark job dead"))?;

            debug!(%job_id, "job exhausted");
            JobFailureOutcome::Exhausted
        };

        tx.commit()
            .await
            .map_err(db_error("Failed to commit job failure"))?;
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn reclaim_stale(&self, stale_threshold: Duration) -> Result<Vec<Uuid>, QueueError> {
        let threshold =
            Utc::now() - chrono::Duration::from_std(stale_threshold).unwrap_or_default();

        let rows = sqlx::query(
            r#"
            UPDATE durable_job_queue
            SET status = 'pending',
                claimed_by = NULL,
                claimed_at = NULL
            WHERE status = 'claimed'
              AND claimed_at < $1
            RETURNING id
            "#,
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to reclaim stale jobs"))?;

        let reclaimed: Vec<Uuid> = rows.iter().map(|r| r.get("id")).collect();
        if !reclaimed.is_empty() {
            debug!(count = reclaimed.len(), "reclaimed stale jobs");
        }
        Ok(reclaimed)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| QueueError::Unavailable(e.to_string()))
    }
}
