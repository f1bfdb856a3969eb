// Site HTTP routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use pushcast_schemas::Site;
use pushcast_worker::{EngineContext, SiteRequest, SiteService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::common::ApiResult;

/// Request to create a new site
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSiteRequest {
    pub name: String,
    /// Bare domain, used for the VAPID contact claim.
    pub domain: String,
    #[serde(default)]
    pub default_icon_url: Option<String>,
}

/// Created site, including the SDK token (only returned here).
#[derive(Debug, Clone, Serialize)]
pub struct SiteCreated {
    pub id: Uuid,
    pub name: String,
    pub domain: String,
    pub vapid_public_key: String,
    pub sdk_token: String,
    pub default_icon_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Site> for SiteCreated {
    fn from(site: Site) -> Self {
        Self {
            id: site.id,
            name: site.name,
            domain: site.domain,
            vapid_public_key: site.vapid_public_key,
            sdk_token: site.sdk_token,
            default_icon_url: site.default_icon_url,
            created_at: site.created_at,
        }
    }
}

/// What the SDK needs before it can subscribe. Public: holds no secrets.
#[derive(Debug, Clone, Serialize)]
pub struct SiteConfig {
    pub site_id: Uuid,
    pub name: String,
    pub vapid_public_key: String,
    pub default_icon_url: Option<String>,
}

impl From<Site> for SiteConfig {
    fn from(site: Site) -> Self {
        Self {
            site_id: site.id,
            name: site.name,
            vapid_public_key: site.vapid_public_key,
            default_icon_url: site.default_icon_url,
        }
    }
}

/// App state for site routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SiteService>,
}

impl AppState {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            service: Arc::new(SiteService::new(ctx)),
        }
    }
}

/// Create site routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/sites", post(create_site))
        .route("/api/site/:id/config", get(get_site_config))
        .with_state(state)
}

/// POST /v1/sites - Create a site with a fresh VAPID keypair
pub async fn create_site(
    State(state): State<AppState>,
    Json(req): Json<CreateSiteRequest>,
) -> ApiResult<(StatusCode, Json<SiteCreated>)> {
    let site = state
        .service
        .create_site(SiteRequest {
            name: req.name,
            domain: req.domain,
            default_icon_url: req.default_icon_url,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(site.into())))
}

/// GET /api/site/:id/config - Public key and display settings for the SDK
pub async fn get_site_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SiteConfig>> {
    let site = state.service.get_site(id).await?;
    Ok(Json(site.into()))
}
