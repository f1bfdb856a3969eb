// Tracking beacons from the service worker
// Decision: Unauthenticated; a beacon for an unknown campaign is a 404, never a write

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use pushcast_worker::{EngineContext, TrackingService};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::common::ApiResult;

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingBeacon {
    pub campaign_id: Uuid,
    #[serde(default)]
    pub subscriber_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TrackingService>,
}

impl AppState {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            service: Arc::new(TrackingService::new(ctx)),
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/track/click", post(track_click))
        .route("/api/track/dismiss", post(track_dismiss))
        .with_state(state)
}

/// POST /api/track/click
pub async fn track_click(
    State(state): State<AppState>,
    Json(beacon): Json<TrackingBeacon>,
) -> ApiResult<StatusCode> {
    state
        .service
        .record_click(beacon.campaign_id, beacon.subscriber_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/track/dismiss
pub async fn track_dismiss(
    State(state): State<AppState>,
    Json(beacon): Json<TrackingBeacon>,
) -> ApiResult<StatusCode> {
    state
        .service
        .record_dismiss(beacon.campaign_id, beacon.subscriber_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
