// Router assembly
// Decision: Health probes the queue on every call instead of caching reachability

use axum::http::{header, HeaderValue, Method};
use axum::{extract::State, routing::get, Json, Router};
use pushcast_worker::DispatchService;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// `disabled`, `reachable` or `unreachable`
    pub queue: &'static str,
    pub dev_mode: bool,
}

async fn health(State(dispatch): State<Arc<DispatchService>>) -> Json<HealthResponse> {
    let queue = match dispatch.queue_reachable().await {
        None => "disabled",
        Some(true) => "reachable",
        Some(false) => "unreachable",
    };

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        queue,
        dev_mode: dispatch.context().storage.is_dev_mode(),
    })
}

/// Build the full HTTP surface around one dispatch service.
pub fn build_router(dispatch: Arc<DispatchService>, cors_origins: Vec<HeaderValue>) -> Router {
    let ctx = dispatch.context().clone();

    let api_routes = Router::new()
        .merge(api::sites::routes(api::sites::AppState::new(ctx.clone())))
        .merge(api::campaigns::routes(api::campaigns::AppState::new(
            dispatch.clone(),
        )))
        .merge(api::webhooks::routes(api::webhooks::AppState::new(
            ctx.storage.clone(),
        )))
        .merge(api::tracking::routes(api::tracking::AppState::new(
            ctx.clone(),
        )))
        .merge(api::subscriptions::routes(
            api::subscriptions::AppState::new(ctx),
        ));

    let app = Router::new()
        .route("/health", get(health).with_state(dispatch))
        .merge(api_routes);

    // Add CORS layer only if origins are configured
    let app = if !cors_origins.is_empty() {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    header::ORIGIN,
                    header::HeaderName::from_static("x-site-token"),
                ]),
        )
    } else {
        app
    };

    app.layer(TraceLayer::new_for_http())
}
