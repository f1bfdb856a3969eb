//! JobQueue trait definition

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reliability::RetryPolicy;

/// Error type for queue operations
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Job not found
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// Backend could not be reached
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Job status in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Claimed,
    Completed,
    /// Exhausted its attempts or failed with a non-retryable error
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Dead => "dead",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition of a job to be enqueued
#[derive(Debug, Clone)]
pub struct JobDefinition {
    pub job_type: String,
    pub payload: serde_json::Value,
    pub retry_policy: RetryPolicy,
}

impl JobDefinition {
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            retry_policy: RetryPolicy::no_retry(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

/// A job that has been claimed by a worker
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    /// 1-based attempt number of this execution
    pub attempt: u32,
    pub max_attempts: u32,
}

impl ClaimedJob {
    /// Whether a failure of this execution will not be retried by the queue.
    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Error reported by a job handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobError {
    /// Matched against `RetryPolicy::non_retryable_errors`
    pub error_type: Option<String>,
    pub message: String,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_type: None,
            message: message.into(),
        }
    }

    pub fn typed(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: Some(error_type.into()),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_type {
            Some(kind) => write!(f, "{kind}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of failing a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailureOutcome {
    /// Job will be retried
    WillRetry { next_attempt: u32, delay: Duration },

    /// No more attempts; job is dead
    Exhausted,
}

/// Durable job queue
///
/// Implementations must be thread-safe and support concurrent claiming by
/// independent worker processes.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Enqueue a single job
    async fn enqueue(&self, job: JobDefinition) -> Result<Uuid, QueueError>;

    /// Enqueue many jobs in one round trip
    async fn enqueue_bulk(&self, jobs: Vec<JobDefinition>) -> Result<Vec<Uuid>, QueueError>;

    /// Claim up to `max_jobs` visible pending jobs of the given types
    async fn claim(
        &self,
        worker_id: &str,
        job_types: &[String],
        max_jobs: usize,
    ) -> Result<Vec<ClaimedJob>, QueueError>;

    /// Complete a job successfully
    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Fail a job; requeues with backoff while the retry policy allows
    async fn fail(&self, job_id: Uuid, error: &JobError) -> Result<JobFailureOutcome, QueueError>;

    /// Return jobs claimed longer than `stale_threshold` ago to pending
    async fn reclaim_stale(&self, stale_threshold: Duration) -> Result<Vec<Uuid>, QueueError>;

    /// Reachability probe
    async fn ping(&self) -> Result<(), QueueError>;
}
