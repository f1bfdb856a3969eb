// Queue worker process wiring
// Decision: Separate pools per job type so slow fan-outs never starve sends

use pushcast_durable::{JobQueue, WorkerPool, WorkerPoolConfig, WorkerPoolError};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::context::EngineContext;
use crate::jobs::{BroadcastJob, SendJob, BROADCAST_JOB, SEND_JOB};

/// Broadcast and send pools bound to one queue.
pub struct DispatchWorker {
    broadcast_pool: WorkerPool,
    send_pool: WorkerPool,
}

impl DispatchWorker {
    pub fn new(ctx: EngineContext, queue: Arc<dyn JobQueue>) -> Self {
        Self::with_poll_interval(ctx, queue, Duration::from_millis(500))
    }

    pub fn with_poll_interval(
        ctx: EngineContext,
        queue: Arc<dyn JobQueue>,
        poll_interval: Duration,
    ) -> Self {
        let config = ctx.config.clone();
        let instance = std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string());

        let broadcast_pool = WorkerPool::new(
            queue.clone(),
            WorkerPoolConfig::new(vec![BROADCAST_JOB.to_string()])
                .with_worker_id(format!("broadcast-{instance}-{}", uuid::Uuid::now_v7()))
                .with_max_concurrency(config.broadcast_concurrency)
                .with_poll_interval(poll_interval),
        );
        let broadcast = BroadcastJob::new(ctx.clone(), queue.clone());
        broadcast_pool.register_handler(BROADCAST_JOB, move |job| {
            let broadcast = broadcast.clone();
            async move { broadcast.handle(job).await }
        });

        let send_pool = WorkerPool::new(
            queue,
            WorkerPoolConfig::new(vec![SEND_JOB.to_string()])
                .with_worker_id(format!("send-{instance}-{}", uuid::Uuid::now_v7()))
                .with_max_concurrency(config.send_concurrency)
                .with_poll_interval(poll_interval),
        );
        let send = SendJob::new(ctx);
        send_pool.register_handler(SEND_JOB, move |job| {
            let send = send.clone();
            async move { send.handle(job).await }
        });

        Self {
            broadcast_pool,
            send_pool,
        }
    }

    pub async fn start(&self) -> Result<(), WorkerPoolError> {
        self.broadcast_pool.start().await?;
        self.send_pool.start().await?;
        info!(
            broadcast_worker = self.broadcast_pool.worker_id(),
            send_worker = self.send_pool.worker_id(),
            "Dispatch worker started"
        );
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), WorkerPoolError> {
        let broadcast = self.broadcast_pool.shutdown().await;
        let send = self.send_pool.shutdown().await;
        broadcast.and(send)
    }

    /// Jobs currently executing across both pools.
    pub fn current_load(&self) -> usize {
        self.broadcast_pool.current_load() + self.send_pool.current_load()
    }
}
