//! Application setup and initialization
//!
//! Startup order: configuration check, telemetry, document store, object
//! storage, services and worker pool, routes.

pub mod database;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;

use crate::state::AppState;
use anyhow::{Context, Result};
use std::sync::Arc;
use weave_core::Config;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    weave_infra::init_telemetry("weave-api", config.environment())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment(),
        "Configuration loaded and validated successfully"
    );

    let repositories = database::setup_database(&config).await?;
    let storage = storage::setup_storage(&config).await?;
    let backends = services::ModelBackends::from_config(&config);

    let state = services::assemble_state(&config, repositories, storage, backends);
    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}
