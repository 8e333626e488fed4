//! Application setup and initialization

pub mod routes;
pub mod server;
pub mod services;

use crate::state::AppState;
use anyhow::{Context, Result};
use lumen_core::Config;
use lumen_worker::WorkerHandle;
use std::sync::Arc;

/// Initialize the entire application: tracing, scan pipeline and routes.
pub async fn initialize_app(config: &Config) -> Result<(Arc<AppState>, axum::Router, WorkerHandle)> {
    crate::telemetry::init_telemetry().context("Failed to initialize telemetry")?;

    tracing::info!(
        environment = %config.base.environment,
        "Configuration loaded and validated successfully"
    );

    let (state, workers) = services::initialize_services(config).await?;
    let router = routes::setup_routes(state.clone());

    Ok((state, router, workers))
}
