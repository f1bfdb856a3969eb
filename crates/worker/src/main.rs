use anyhow::{Context, Result};
use pushcast_durable::{JobQueue, PostgresJobQueue};
use pushcast_storage::{KeyVault, StorageBackend};
use pushcast_worker::{
    init_tracing, DispatchConfig, DispatchService, DispatchWorker, EngineContext, Scheduler,
    WebPushTransport, WebhookNotifier,
};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // RUST_LOG overrides; LOG_FORMAT=json for structured output
    init_tracing("pushcast_worker=debug,pushcast_durable=info");

    tracing::info!("pushcast-worker starting...");

    let config = DispatchConfig::from_env();
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set for the worker")?;

    let storage = StorageBackend::postgres(&database_url)
        .await
        .context("Failed to connect to store")?;
    let vault = KeyVault::from_env().context("Failed to initialise key vault")?;
    let transport = WebPushTransport::new().context("Failed to build push client")?;
    let notifier = WebhookNotifier::new(storage.webhooks.clone(), config.webhook_timeout)
        .context("Failed to build webhook client")?;

    let queue: Option<Arc<dyn JobQueue>> = match config.queue_url() {
        Some(url) => {
            let queue = PostgresJobQueue::connect_lazy(url).context("Invalid queue URL")?;
            queue.migrate().await.context("Failed to migrate job queue")?;
            Some(Arc::new(queue))
        }
        None => None,
    };

    let ctx = EngineContext::new(storage, vault, Arc::new(transport), notifier, config);
    let dispatch = DispatchService::new(ctx.clone(), queue.clone());

    let worker = match queue {
        Some(queue) => {
            let worker = DispatchWorker::new(ctx.clone(), queue);
            worker.start().await.context("Failed to start worker pools")?;
            Some(worker)
        }
        None => {
            tracing::info!("Queue disabled; only the scheduler runs in this process");
            None
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(dispatch, ctx.config.scheduler_interval).spawn(shutdown_rx);

    tracing::info!("Worker ready, waiting for shutdown signal...");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    if let Some(worker) = worker {
        if let Err(e) = worker.shutdown().await {
            tracing::warn!(error = %e, "Worker pools did not drain cleanly");
        }
    }
    let _ = scheduler.await;

    tracing::info!("Worker shutdown complete");
    Ok(())
}
