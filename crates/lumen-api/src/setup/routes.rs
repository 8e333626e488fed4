//! Route configuration and setup

use crate::constants::{API_PREFIX, DEFAULT_HTTP_CONCURRENCY_LIMIT, MAX_REQUEST_BODY_BYTES};
use crate::handlers::{analysis, health};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Setup all application routes
pub fn setup_routes(state: Arc<AppState>) -> Router<()> {
    let http_concurrency_limit = std::env::var("HTTP_CONCURRENCY_LIMIT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_HTTP_CONCURRENCY_LIMIT)
        .max(1);
    tracing::debug!(http_concurrency_limit, "HTTP concurrency limit layer enabled");

    Router::new()
        .nest(API_PREFIX, api_routes())
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/analysis",
            post(analysis::create_analysis).get(analysis::list_analyses),
        )
        .route("/analysis/completed", get(analysis::list_completed_analyses))
        .route("/analysis/stats", get(analysis::analysis_stats))
        .route("/analysis/{id}", get(analysis::get_analysis))
}
