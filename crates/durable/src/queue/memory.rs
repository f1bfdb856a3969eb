//! In-memory implementation of JobQueue for testing

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use super::store::*;

/// Internal job state
struct JobState {
    definition: JobDefinition,
    status: JobStatus,
    attempt: u32,
    seq: u64,
    visible_at: Instant,
    claimed_by: Option<String>,
    claimed_at: Option<Instant>,
    last_error: Option<String>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, JobState>,
    next_seq: u64,
}

/// In-memory implementation of JobQueue
///
/// Stores all jobs in memory and provides the same claiming and retry
/// semantics as the PostgreSQL implementation. Visibility delays follow
/// tokio's clock, so paused-time tests can advance through backoff.
///
/// # Example
///
/// ```
/// use pushcast_durable::InMemoryJobQueue;
///
/// let queue = InMemoryJobQueue::new();
/// assert_eq!(queue.job_count(), 0);
/// ```
#[derive(Default)]
pub struct InMemoryJobQueue {
    inner: RwLock<Inner>,
}

impl InMemoryJobQueue {
    /// Create a new in-memory queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of jobs ever enqueued
    pub fn job_count(&self) -> usize {
        self.inner.read().jobs.len()
    }

    /// Count jobs of a type in a given status
    pub fn count(&self, job_type: &str, status: JobStatus) -> usize {
        self.inner
            .read()
            .jobs
            .values()
            .filter(|j| j.definition.job_type == job_type && j.status == status)
            .count()
    }

    /// Payloads of all jobs of a type, in enqueue order
    pub fn payloads(&self, job_type: &str) -> Vec<serde_json::Value> {
        let inner = self.inner.read();
        let mut jobs: Vec<&JobState> = inner
            .jobs
            .values()
            .filter(|j| j.definition.job_type == job_type)
            .collect();
        jobs.sort_by_key(|j| j.seq);
        jobs.into_iter()
            .map(|j| j.definition.payload.clone())
            .collect()
    }

    /// Status of a job
    pub fn status(&self, job_id: Uuid) -> Option<JobStatus> {
        self.inner.read().jobs.get(&job_id).map(|j| j.status)
    }

    /// Worker currently holding a job
    pub fn claimed_by(&self, job_id: Uuid) -> Option<String> {
        self.inner
            .read()
            .jobs
            .get(&job_id)
            .and_then(|j| j.claimed_by.clone())
    }

    /// Last recorded error of a job
    pub fn last_error(&self, job_id: Uuid) -> Option<String> {
        self.inner
            .read()
            .jobs
            .get(&job_id)
            .and_then(|j| j.last_error.clone())
    }

    fn insert(inner: &mut Inner, job: JobDefinition) -> Uuid {
        let id = Uuid::now_v7();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.jobs.insert(
            id,
            JobState {
                definition: job,
                status: JobStatus::Pending,
                attempt: 0,
                seq,
                visible_at: Instant::now(),
                claimed_by: None,
                claimed_at: None,
                last_error: None,
            },
        );
        id
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: JobDefinition) -> Result<Uuid, QueueError> {
        Ok(Self::insert(&mut self.inner.write(), job))
    }

    async fn enqueue_bulk(&self, jobs: Vec<JobDefinition>) -> Result<Vec<Uuid>, QueueError> {
        let mut inner = self.inner.write();
        Ok(jobs
            .into_iter()
            .map(|job| Self::insert(&mut inner, job))
            .collect())
    }

    async fn claim(
        &self,
        worker_id: &str,
        job_types: &[String],
        max_jobs: usize,
    ) -> Result<Vec<ClaimedJob>, QueueError> {
        let now = Instant::now();
        let mut inner = self.inner.write();

        let mut candidates: Vec<(u64, Uuid)> = inner
            .jobs
            .iter()
            .filter(|(_, j)| {
                j.status == JobStatus::Pending
                    && j.visible_at <= now
                    && job_types.contains(&j.definition.job_type)
            })
            .map(|(id, j)| (j.seq, *id))
            .collect();
        candidates.sort();
        candidates.truncate(max_jobs);

        let mut claimed = Vec::with_capacity(candidates.len());
        for (_, id) in candidates {
            if let Some(job) = inner.jobs.get_mut(&id) {
                job.status = JobStatus::Claimed;
                job.claimed_by = Some(worker_id.to_string());
                job.claimed_at = Some(now);
                job.attempt += 1;

                claimed.push(ClaimedJob {
                    id,
                    job_type: job.definition.job_type.clone(),
                    payload: job.definition.payload.clone(),
                    attempt: job.attempt,
                    max_attempts: job.definition.retry_policy.max_attempts,
                });
            }
        }

        Ok(claimed)
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut inner = self.inner.write();
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;
        job.status = JobStatus::Completed;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &JobError) -> Result<JobFailureOutcome, QueueError> {
        let mut inner = self.inner.write();
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;

        job.last_error = Some(error.to_string());
        let policy = &job.definition.retry_policy;

        if policy.has_attempts_remaining(job.attempt)
            && policy.should_retry(error.error_type.as_deref())
        {
            let next_attempt = job.attempt + 1;
            let delay = policy.delay_for_attempt(next_attempt);
            job.status = JobStatus::Pending;
            job.claimed_by = None;
            job.claimed_at = None;
            job.visible_at = Instant::now() + delay;
            Ok(JobFailureOutcome::WillRetry {
                next_attempt,
                delay,
            })
        } else {
            job.status = JobStatus::Dead;
            Ok(JobFailureOutcome::Exhausted)
        }
    }

    async fn reclaim_stale(&self, stale_threshold: Duration) -> Result<Vec<Uuid>, QueueError> {
        let now = Instant::now();
        let mut inner = self.inner.write();
        let mut reclaimed = Vec::new();

        for (id, job) in inner.jobs.iter_mut() {
            let stale = job
                .claimed_at
                .is_some_and(|at| now.duration_since(at) > stale_threshold);
            if job.status == JobStatus::Claimed && stale {
                job.status = JobStatus::Pending;
                job.claimed_by = None;
                job.claimed_at = None;
                reclaimed.push(*id);
            }
        }

        Ok(reclaimed)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reliability::RetryPolicy;
    use serde_json::json;

    fn types(t: &str) -> Vec<String> {
        vec![t.to_string()]
    }

    #[tokio::test]
    async fn test_claim_is_fifo_and_exclusive() {
        let queue = InMemoryJobQueue::new();
        let ids = queue
            .enqueue_bulk(vec![
                JobDefinition::new("send", json!({"n": 1})),
                JobDefinition::new("send", json!({"n": 2})),
                JobDefinition::new("other", json!({})),
            ])
            .await
            .unwrap();

        let first = queue.claim("w1", &types("send"), 1).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, ids[0]);
        assert_eq!(first[0].attempt, 1);
        assert_eq!(queue.claimed_by(ids[0]).as_deref(), Some("w1"));

        let rest = queue.claim("w2", &types("send"), 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].payload, json!({"n": 2}));

        assert!(queue.claim("w3", &types("send"), 10).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_retries_after_backoff() {
        let queue = InMemoryJobQueue::new();
        let id = queue
            .enqueue(JobDefinition::new("send", json!({})).with_retry_policy(RetryPolicy::push_send()))
            .await
            .unwrap();

        let job = queue.claim("w", &types("send"), 1).await.unwrap().remove(0);
        assert!(!job.is_final_attempt());

        let outcome = queue.fail(id, &JobError::new("503")).await.unwrap();
        assert_eq!(
            outcome,
            JobFailureOutcome::WillRetry {
                next_attempt: 2,
                delay: Duration::from_secs(5)
            }
        );

        // Not visible until the backoff elapses
        assert!(queue.claim("w", &types("send"), 1).await.unwrap().is_empty());
        tokio::time::advance(Duration::from_secs(5)).await;

        let job = queue.claim("w", &types("send"), 1).await.unwrap().remove(0);
        assert_eq!(job.attempt, 2);
        queue.fail(id, &JobError::new("503")).await.unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        let job = queue.claim("w", &types("send"), 1).await.unwrap().remove(0);
        assert!(job.is_final_attempt());

        let outcome = queue.fail(id, &JobError::new("503")).await.unwrap();
        assert_eq!(outcome, JobFailureOutcome::Exhausted);
        assert_eq!(queue.status(id), Some(JobStatus::Dead));
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_dead_immediately() {
        let queue = InMemoryJobQueue::new();
        let policy = RetryPolicy::push_send().with_non_retryable_error("key_vault");
        let id = queue
            .enqueue(JobDefinition::new("send", json!({})).with_retry_policy(policy))
            .await
            .unwrap();
        queue.claim("w", &types("send"), 1).await.unwrap();

        let outcome = queue
            .fail(id, &JobError::typed("key_vault", "decrypt failed"))
            .await
            .unwrap();

        assert_eq!(outcome, JobFailureOutcome::Exhausted);
        assert_eq!(queue.last_error(id).as_deref(), Some("key_vault: decrypt failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaim_stale() {
        let queue = InMemoryJobQueue::new();
        let id = queue.enqueue(JobDefinition::new("send", json!({}))).await.unwrap();
        queue.claim("w", &types("send"), 1).await.unwrap();

        assert!(queue.reclaim_stale(Duration::from_secs(60)).await.unwrap().is_empty());
        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(queue.reclaim_stale(Duration::from_secs(60)).await.unwrap(), vec![id]);
        assert_eq!(queue.status(id), Some(JobStatus::Pending));
    }
}
