//! HTTP scrape endpoint for the metrics bridge.

use super::MetricsBridge;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Content type of the Prometheus text format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub type SharedBridge = Arc<MetricsBridge>;

/// Build an axum Router with `/metrics` and `/health` routes.
pub fn router(bridge: SharedBridge) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(bridge)
}

/// Render the exposition on every scrape; upstream failures become 502.
async fn metrics_handler(State(bridge): State<SharedBridge>) -> impl IntoResponse {
    match bridge.render().await {
        Ok(mut body) => {
            if !body.is_empty() {
                body.push('\n');
            }
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
                body,
            )
        }
        Err(e) => {
            warn!(error = %e, "metrics scrape failed");
            (
                StatusCode::BAD_GATEWAY,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                e.to_string(),
            )
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// Serve the bridge on `bind` until the task is cancelled.
pub async fn serve(bridge: SharedBridge, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %listener.local_addr()?, "serving metrics");
    axum::serve(listener, router(bridge)).await
}
