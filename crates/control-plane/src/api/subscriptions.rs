// SDK subscription routes
// Decision: The SDK authenticates with the site's token in `X-Site-Token`; it must match `site_id`

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use pushcast_schemas::Site;
use pushcast_storage::NewSubscriber;
use pushcast_worker::{EngineContext, SubscriptionService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::common::{ApiError, ApiResult};

pub const SITE_TOKEN_HEADER: &str = "X-Site-Token";

/// Keys from the browser's `PushSubscription.toJSON()`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeRequest {
    pub site_id: Uuid,
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub tags: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribeRequest {
    pub site_id: Uuid,
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagsRequest {
    pub site_id: Uuid,
    pub endpoint: String,
    pub tags: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagsResponse {
    pub tags: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeResponse {
    pub subscriber_id: Uuid,
    pub created: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SubscriptionService>,
}

impl AppState {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            service: Arc::new(SubscriptionService::new(ctx)),
        }
    }

    async fn authenticate(&self, headers: &HeaderMap, site_id: Uuid) -> ApiResult<Site> {
        let token = headers
            .get(SITE_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(ApiError::unauthorized)?;

        self.service
            .authenticate(site_id, token)
            .await?
            .ok_or_else(ApiError::unauthorized)
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/subscribe", post(subscribe).delete(unsubscribe))
        .route("/api/subscriber/tags", post(update_tags))
        .with_state(state)
}

/// POST /api/subscribe - Register or refresh a browser subscription
pub async fn subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<(StatusCode, Json<SubscribeResponse>)> {
    let site = state.authenticate(&headers, req.site_id).await?;
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    let (subscriber, created) = state
        .service
        .subscribe(
            NewSubscriber {
                site_id: site.id,
                endpoint: req.endpoint,
                p256dh: req.keys.p256dh,
                auth: req.keys.auth,
                browser: req.browser,
                os: req.os,
                country: req.country,
                tags: req.tags.unwrap_or_else(|| serde_json::json!({})),
            },
            user_agent,
        )
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(SubscribeResponse {
            subscriber_id: subscriber.id,
            created,
        }),
    ))
}

/// DELETE /api/subscribe - Drop a browser subscription by endpoint
pub async fn unsubscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UnsubscribeRequest>,
) -> ApiResult<StatusCode> {
    let site = state.authenticate(&headers, req.site_id).await?;

    state
        .service
        .unsubscribe(site.id, &req.endpoint)
        .await?
        .ok_or_else(|| ApiError::not_found("subscription not found"))?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/subscriber/tags - Merge tags into a subscriber's existing tags
pub async fn update_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TagsRequest>,
) -> ApiResult<Json<TagsResponse>> {
    let site = state.authenticate(&headers, req.site_id).await?;

    let tags = state
        .service
        .merge_tags(site.id, &req.endpoint, req.tags)
        .await?;

    Ok(Json(TagsResponse { tags }))
}
