// Webhook registration routes
// Decision: The signing secret is returned once, on creation; reads never expose it

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use pushcast_schemas::{Webhook, WebhookDelivery};
use pushcast_storage::StorageBackend;
use pushcast_worker::register_webhook;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::common::{ApiError, ApiResult, ListResponse};

/// Delivery history page size.
const DELIVERY_HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWebhookRequest {
    pub site_id: Uuid,
    /// Must be `https://`.
    pub target_url: String,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookCreated {
    pub id: Uuid,
    pub site_id: Uuid,
    pub target_url: String,
    pub events: Vec<String>,
    pub is_active: bool,
    /// Key for verifying `X-Push-Signature`.
    pub secret_token: String,
    pub created_at: DateTime<Utc>,
}

impl From<Webhook> for WebhookCreated {
    fn from(webhook: Webhook) -> Self {
        Self {
            id: webhook.id,
            site_id: webhook.site_id,
            target_url: webhook.target_url,
            events: webhook.events,
            is_active: webhook.is_active,
            secret_token: webhook.secret_token,
            created_at: webhook.created_at,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub storage: StorageBackend,
}

impl AppState {
    pub fn new(storage: StorageBackend) -> Self {
        Self { storage }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/webhooks", post(create_webhook))
        .route("/v1/webhooks/:webhook_id/deliveries", get(list_deliveries))
        .with_state(state)
}

/// POST /v1/webhooks - Register a webhook for a site
pub async fn create_webhook(
    State(state): State<AppState>,
    Json(req): Json<CreateWebhookRequest>,
) -> ApiResult<(StatusCode, Json<WebhookCreated>)> {
    state
        .storage
        .sites
        .get_site(req.site_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("site not found: {}", req.site_id)))?;

    let webhook = register_webhook(
        state.storage.webhooks.as_ref(),
        req.site_id,
        &req.target_url,
        req.events,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(webhook.into())))
}

/// GET /v1/webhooks/{webhook_id}/deliveries - Most recent delivery attempts
pub async fn list_deliveries(
    State(state): State<AppState>,
    Path(webhook_id): Path<Uuid>,
) -> ApiResult<Json<ListResponse<WebhookDelivery>>> {
    let webhooks = &state.storage.webhooks;
    webhooks
        .get_webhook(webhook_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("webhook not found: {webhook_id}")))?;

    let deliveries = webhooks
        .list_deliveries(webhook_id, DELIVERY_HISTORY_LIMIT)
        .await?;
    Ok(Json(deliveries.into()))
}
