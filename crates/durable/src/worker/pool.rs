//! Worker pool for job execution
//!
//! Claims jobs for its registered types, runs them with bounded concurrency and
//! reports the outcome back to the queue. Shuts down gracefully on request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::queue::{ClaimedJob, JobError, JobFailureOutcome, JobQueue, QueueError};

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Unique worker ID (generated if not provided)
    pub worker_id: String,

    /// Job types this worker handles
    pub job_types: Vec<String>,

    /// Maximum concurrent job executions
    pub max_concurrency: usize,

    /// Delay between polls when the queue is empty
    pub poll_interval: Duration,

    /// Stale job reclamation interval
    pub stale_reclaim_interval: Duration,

    /// How long a claim may be held before it is considered abandoned
    pub stale_threshold: Duration,

    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            job_types: vec![],
            max_concurrency: 10,
            poll_interval: Duration::from_millis(500),
            stale_reclaim_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    /// Create a new worker pool configuration
    pub fn new(job_types: Vec<String>) -> Self {
        Self {
            job_types,
            ..Default::default()
        }
    }

    /// Set the worker ID
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set maximum concurrency
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Worker is running and accepting jobs
    Running,
    /// Worker is draining (completing current jobs, not accepting new ones)
    Draining,
    /// Worker has stopped
    Stopped,
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    /// Queue error
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Worker already running
    #[error("worker pool is already running")]
    AlreadyRunning,

    /// Shutdown timeout
    #[error("graceful shutdown timed out")]
    ShutdownTimeout,
}

/// Job execution result
pub type JobResult = Result<(), JobError>;

/// Job handler function type
pub type JobHandler = Arc<
    dyn Fn(ClaimedJob) -> std::pin::Pin<Box<dyn std::future::Future<Output = JobResult> + Send>>
        + Send
        + Sync,
>;

/// Worker pool for executing jobs
///
/// # Example
///
/// ```ignore
/// use pushcast_durable::{WorkerPool, WorkerPoolConfig};
///
/// let config = WorkerPoolConfig::new(vec!["push.send".to_string()])
///     .with_max_concurrency(50);
///
/// let pool = WorkerPool::new(queue, config);
/// pool.register_handler("push.send", |job| async move { Ok(()) });
/// pool.start().await?;
///
/// // ... later, graceful shutdown
/// pool.shutdown().await?;
/// ```
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    config: WorkerPoolConfig,
    handlers: RwLock<HashMap<String, JobHandler>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    status: RwLock<WorkerPoolStatus>,
    active_jobs: Arc<Semaphore>,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
    reclaim_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(queue: Arc<dyn JobQueue>, config: WorkerPoolConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            queue,
            active_jobs: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
            handlers: RwLock::new(HashMap::new()),
            shutdown_tx,
            shutdown_rx,
            status: RwLock::new(WorkerPoolStatus::Stopped),
            poll_handle: Mutex::new(None),
            reclaim_handle: Mutex::new(None),
        }
    }

    /// Register a job handler
    pub fn register_handler<F, Fut>(&self, job_type: &str, handler: F)
    where
        F: Fn(ClaimedJob) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = JobResult> + Send + 'static,
    {
        let handler: JobHandler = Arc::new(move |job| Box::pin(handler(job)));
        self.handlers.write().insert(job_type.to_string(), handler);
    }

    /// Start the worker pool
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn start(&self) -> Result<(), WorkerPoolError> {
        if *self.status.read() == WorkerPoolStatus::Running {
            return Err(WorkerPoolError::AlreadyRunning);
        }

        info!(
            worker_id = %self.config.worker_id,
            job_types = ?self.config.job_types,
            max_concurrency = self.config.max_concurrency,
            "Starting worker pool"
        );

        *self.status.write() = WorkerPoolStatus::Running;
        self.start_poll_loop();
        self.start_reclaim_loop();

        Ok(())
    }

    /// Shutdown the worker pool gracefully
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn shutdown(&self) -> Result<(), WorkerPoolError> {
        if *self.status.read() == WorkerPoolStatus::Stopped {
            return Ok(());
        }

        info!(worker_id = %self.config.worker_id, "Initiating graceful shutdown");

        *self.status.write() = WorkerPoolStatus::Draining;
        let _ = self.shutdown_tx.send(true);

        let handles = [self.poll_handle.lock().take(), self.reclaim_handle.lock().take()];
        for handle in handles.into_iter().flatten() {
            let _ = handle.await;
        }

        // Wait for in-flight jobs
        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        loop {
            let available = self.active_jobs.available_permits();
            if available == self.config.max_concurrency {
                debug!("All jobs completed");
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(
                    remaining_jobs = self.config.max_concurrency - available,
                    "Shutdown timeout reached"
                );
                return Err(WorkerPoolError::ShutdownTimeout);
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        *self.status.write() = WorkerPoolStatus::Stopped;
        info!(worker_id = %self.config.worker_id, "Worker pool stopped");
        Ok(())
    }

    /// Get current status
    pub fn status(&self) -> WorkerPoolStatus {
        *self.status.read()
    }

    /// Number of jobs currently executing
    pub fn current_load(&self) -> usize {
        self.config.max_concurrency - self.active_jobs.available_permits()
    }

    /// Get the worker ID
    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Start the polling loop
    fn start_poll_loop(&self) {
        let queue = Arc::clone(&self.queue);
        let config = self.config.clone();
        let handlers = self.handlers.read().clone();
        let active_jobs = Arc::clone(&self.active_jobs);
        let mut shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    debug!("Poll loop: shutdown requested");
                    break;
                }

                let available_slots = active_jobs.available_permits();
                let claimed = if available_slots == 0 {
                    Vec::new()
                } else {
                    match queue
                        .claim(&config.worker_id, &config.job_types, available_slots)
                        .await
                    {
                        Ok(jobs) => jobs,
                        Err(e) => {
                            error!("Poll error: {}", e);
                            Vec::new()
                        }
                    }
                };

                let idle = claimed.is_empty();

                for job in claimed {
                    let Some(handler) = handlers.get(&job.job_type).cloned() else {
                        warn!(job_type = %job.job_type, "No handler registered");
                        let err = JobError::typed("unhandled", "no handler registered");
                        if let Err(e) = queue.fail(job.id, &err).await {
                            error!(job_id = %job.id, "Failed to fail job: {}", e);
                        }
                        continue;
                    };

                    let permit = match active_jobs.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => break,
                    };

                    let queue = Arc::clone(&queue);
                    tokio::spawn(async move {
                        let job_id = job.id;
                        let job_type = job.job_type.clone();

                        match handler(job).await {
                            Ok(()) => {
                                if let Err(e) = queue.complete(job_id).await {
                                    error!(%job_id, "Failed to complete job: {}", e);
                                }
                            }
                            Err(job_error) => match queue.fail(job_id, &job_error).await {
                                Ok(JobFailureOutcome::WillRetry {
                                    next_attempt,
                                    delay,
                                }) => {
                                    debug!(%job_id, %job_type, next_attempt, ?delay, error = %job_error, "Job failed, will retry");
                                }
                                Ok(JobFailureOutcome::Exhausted) => {
                                    warn!(%job_id, %job_type, error = %job_error, "Job failed permanently");
                                }
                                Err(e) => {
                                    error!(%job_id, "Failed to fail job: {}", e);
                                }
                            },
                        }

                        drop(permit);
                    });
                }

                if idle {
                    tokio::select! {
                        _ = tokio::time::sleep(config.poll_interval) => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
            }

            debug!("Poll loop exited");
        });

        *self.poll_handle.lock() = Some(handle);
    }

    /// Start the stale job reclamation loop
    fn start_reclaim_loop(&self) {
        let queue = Arc::clone(&self.queue);
        let interval = self.config.stale_reclaim_interval;
        let threshold = self.config.stale_threshold;
        let mut shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match queue.reclaim_stale(threshold).await {
                            Ok(reclaimed) => {
                                if !reclaimed.is_empty() {
                                    info!(count = reclaimed.len(), "Reclaimed stale jobs");
                                }
                            }
                            Err(e) => {
                                error!("Stale job reclamation failed: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Reclaim loop: shutdown requested");
                        break;
                    }
                }
            }

            debug!("Reclaim loop exited");
        });

        *self.reclaim_handle.lock() = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{InMemoryJobQueue, JobDefinition, JobStatus};
    use crate::reliability::RetryPolicy;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_config() {
        let config = WorkerPoolConfig::default();
        assert!(config.worker_id.starts_with("worker-"));
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.stale_threshold, Duration::from_secs(300));
    }

    #[test]
    fn test_config_builder() {
        let config = WorkerPoolConfig::new(vec!["push.send".to_string()])
            .with_worker_id("send-worker")
            .with_max_concurrency(0)
            .with_poll_interval(Duration::from_millis(10));

        assert_eq!(config.worker_id, "send-worker");
        assert_eq!(config.job_types, vec!["push.send"]);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }

    async fn wait_for<F: Fn() -> bool>(check: F) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_pool_runs_and_completes_jobs() {
        let queue = Arc::new(InMemoryJobQueue::new());
        for n in 0..5 {
            queue
                .enqueue(JobDefinition::new("count", json!({ "n": n })))
                .await
                .unwrap();
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(
            queue.clone(),
            WorkerPoolConfig::new(vec!["count".to_string()])
                .with_max_concurrency(2)
                .with_poll_interval(Duration::from_millis(10)),
        );
        let counter = seen.clone();
        pool.register_handler("count", move |_job| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        pool.start().await.unwrap();
        assert!(matches!(pool.start().await, Err(WorkerPoolError::AlreadyRunning)));

        wait_for(|| queue.count("count", JobStatus::Completed) == 5).await;
        pool.shutdown().await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(pool.status(), WorkerPoolStatus::Stopped);
    }

    #[tokio::test]
    async fn test_failing_job_is_retried_until_exhausted() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let policy = RetryPolicy::with_schedule(vec![Duration::ZERO], 3);
        queue
            .enqueue(JobDefinition::new("flaky", json!({})).with_retry_policy(policy))
            .await
            .unwrap();

        let attempts = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(
            queue.clone(),
            WorkerPoolConfig::new(vec!["flaky".to_string()])
                .with_poll_interval(Duration::from_millis(5)),
        );
        let counter = attempts.clone();
        pool.register_handler("flaky", move |_job| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(JobError::new("boom"))
            }
        });

        pool.start().await.unwrap();
        wait_for(|| queue.count("flaky", JobStatus::Dead) == 1).await;
        pool.shutdown().await.unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
