//! Web server module for the exporter.
//!
//! Serves the landing page, a liveness probe and the per-target scrape
//! endpoint.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::collector::{RegistryError, TargetRegistry};
use crate::config::HEALTH_PATH;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TargetRegistry>,
}

impl AppState {
    pub fn new(registry: TargetRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

/// Query parameters for the scrape endpoint.
#[derive(Debug, Deserialize)]
pub struct ScrapeParams {
    pub target: Option<String>,
}

fn landing_page(telemetry_path: &str) -> String {
    format!(
        "<html>\n\
         <head><title>Oracle DB Exporter</title></head>\n\
         <body>\n\
         <h1>Oracle DB Exporter</h1>\n\
         <p><a href=\"{telemetry_path}\">Metrics</a> (requires <code>?target=&lt;connection&gt;</code>)</p>\n\
         </body>\n\
         </html>\n"
    )
}

/// Create the Axum router with all routes.
///
/// `telemetry_path` must pass [`validate_telemetry_path`](crate::config::validate_telemetry_path).
pub fn create_router(state: AppState, telemetry_path: &str) -> Router {
    let page: Arc<str> = landing_page(telemetry_path).into();

    Router::new()
        .route(
            "/",
            get(move || {
                let page = Arc::clone(&page);
                async move { Html(page.to_string()) }
            }),
        )
        .route(HEALTH_PATH, get(healthz_handler))
        .route(telemetry_path, get(scrape_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .with_state(state)
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Scrape one target and return its metrics in the text exposition format.
async fn scrape_handler(
    State(state): State<AppState>,
    Query(params): Query<ScrapeParams>,
) -> Response {
    let target = params.target.unwrap_or_default();

    let handler = match state.registry.resolve(&target).await {
        Ok(handler) => handler,
        Err(e @ RegistryError::UnknownTarget(_)) => {
            tracing::warn!(target_id = %target, "Scrape requested for unknown target");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
        Err(e) => {
            tracing::error!(target_id = %target, error = %e, "Failed to create target handler");
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response();
        }
    };

    match tokio::task::spawn_blocking(move || handler.render()).await {
        Ok(Ok(body)) => {
            let content_type = TextEncoder::new().format_type().to_string();
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Ok(Err(e)) => {
            tracing::error!(target_id = %target, error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
        Err(e) => {
            tracing::error!(target_id = %target, error = %e, "Scrape task aborted");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
    }
}
