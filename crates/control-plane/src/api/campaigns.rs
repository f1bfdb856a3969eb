// Campaign HTTP routes
// Decision: Send returns 202 as soon as the dispatcher accepts; progress is read back via GET

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use pushcast_schemas::Campaign;
use pushcast_storage::NewCampaign;
use pushcast_worker::{DispatchError, DispatchService, SendAccepted};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::common::ApiResult;

/// Request to create a new campaign
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    pub site_id: Uuid,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub badge_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Page opened when the notification is clicked.
    pub target_url: String,
    /// Stored with the campaign; audience selection ignores it for now.
    #[serde(default)]
    pub segment_filters: Option<serde_json::Value>,
    /// When set, the campaign is created `scheduled` and sent by the worker's poller.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl From<CreateCampaignRequest> for NewCampaign {
    fn from(req: CreateCampaignRequest) -> Self {
        Self {
            site_id: req.site_id,
            title: req.title,
            body: req.body,
            icon_url: req.icon_url,
            badge_url: req.badge_url,
            image_url: req.image_url,
            target_url: req.target_url,
            segment_filters: req.segment_filters,
            scheduled_at: req.scheduled_at,
        }
    }
}

/// Campaign with its derived click-through rate.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignResponse {
    #[serde(flatten)]
    pub campaign: Campaign,
    /// `clicked / delivered * 100`, e.g. `"12.50%"`.
    pub click_through_rate: String,
}

impl From<Campaign> for CampaignResponse {
    fn from(campaign: Campaign) -> Self {
        let click_through_rate = campaign.counters.click_through_rate();
        Self {
            campaign,
            click_through_rate,
        }
    }
}

/// App state for campaign routes
#[derive(Clone)]
pub struct AppState {
    pub dispatch: Arc<DispatchService>,
}

impl AppState {
    pub fn new(dispatch: Arc<DispatchService>) -> Self {
        Self { dispatch }
    }
}

/// Create campaign routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/campaigns", post(create_campaign))
        .route(
            "/v1/campaigns/:campaign_id",
            get(get_campaign).delete(delete_campaign),
        )
        .route("/v1/campaigns/:campaign_id/send", post(send_campaign))
        .with_state(state)
}

/// POST /v1/campaigns - Create a draft (or scheduled) campaign
pub async fn create_campaign(
    State(state): State<AppState>,
    Json(req): Json<CreateCampaignRequest>,
) -> ApiResult<(StatusCode, Json<CampaignResponse>)> {
    let campaign = state.dispatch.create_campaign(req.into()).await?;
    Ok((StatusCode::CREATED, Json(campaign.into())))
}

/// GET /v1/campaigns/{campaign_id} - Get campaign with counters
pub async fn get_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<CampaignResponse>> {
    let campaign = state
        .dispatch
        .context()
        .storage
        .campaigns
        .get_campaign(campaign_id)
        .await?
        .ok_or(DispatchError::CampaignNotFound(campaign_id))?;

    Ok(Json(campaign.into()))
}

/// POST /v1/campaigns/{campaign_id}/send - Start broadcasting
pub async fn send_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<SendAccepted>)> {
    let accepted = state.dispatch.request_send(campaign_id).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// DELETE /v1/campaigns/{campaign_id} - Delete a campaign that is not dispatching
pub async fn delete_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.dispatch.delete_campaign(campaign_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
