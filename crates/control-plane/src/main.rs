// Pushcast API server
// Decision: Without DATABASE_URL the server runs on the in-memory store (dev mode)
// Decision: Inline broadcasts run inside this process; queued ones are picked up by pushcast-worker

use anyhow::{Context, Result};
use pushcast_control_plane::{build_router, ServerConfig};
use pushcast_durable::{JobQueue, PostgresJobQueue};
use pushcast_storage::{KeyVault, StorageBackend};
use pushcast_worker::{
    init_tracing, DispatchConfig, DispatchService, EngineContext, WebPushTransport,
    WebhookNotifier,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // RUST_LOG overrides; LOG_FORMAT=json for structured output
    init_tracing("pushcast_control_plane=debug,pushcast_worker=debug,tower_http=debug");

    tracing::info!("pushcast-control-plane starting...");

    let server_config = ServerConfig::from_env();
    let dispatch_config = DispatchConfig::from_env();

    let storage = match std::env::var("DATABASE_URL") {
        Ok(url) => StorageBackend::postgres(&url)
            .await
            .context("Failed to connect to database")?,
        Err(_) => StorageBackend::in_memory(),
    };

    let vault = KeyVault::from_env().context("VAPID_ENCRYPTION_KEY must be a 64-char hex key")?;
    let transport = WebPushTransport::new().context("Failed to build push client")?;
    let notifier = WebhookNotifier::new(storage.webhooks.clone(), dispatch_config.webhook_timeout)
        .context("Failed to build webhook client")?;

    let queue: Option<Arc<dyn JobQueue>> = match dispatch_config.queue_url() {
        Some(url) => {
            let queue = PostgresJobQueue::connect_lazy(url).context("Invalid queue URL")?;
            tracing::info!("Queue backend configured");
            Some(Arc::new(queue))
        }
        None => {
            tracing::info!("Queue backend disabled, campaigns are broadcast inline");
            None
        }
    };

    let ctx = EngineContext::new(
        storage,
        vault,
        Arc::new(transport),
        notifier,
        dispatch_config,
    );
    let dispatch = Arc::new(DispatchService::new(ctx, queue));

    let cors_origins = server_config.cors_origins();
    if cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?cors_origins, "CORS origins configured");
    }

    let app = build_router(dispatch, cors_origins);

    let addr = server_config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    Ok(())
}
