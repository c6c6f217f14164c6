//! Liveness and readiness probes.

use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::state::DbState;

const READINESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Liveness probe - process is running.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is alive"))
)]
pub async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Readiness probe - the document store answers.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Ready to serve traffic"),
        (status = 503, description = "Document store unreachable")
    )
)]
pub async fn readiness(State(db): State<DbState>) -> impl IntoResponse {
    let database = match tokio::time::timeout(READINESS_TIMEOUT, db.jobs.ping()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Database readiness check failed");
            Err(format!("not_ready: {}", e))
        }
        Err(_) => {
            tracing::error!("Database readiness check timed out");
            Err("timeout".to_string())
        }
    };

    match database {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ready", "database": "ready" })),
        ),
        Err(database) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not_ready", "database": database })),
        ),
    }
}
