use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use weave_core::constants::{DEFAULT_JOB_LIST_LIMIT, MAX_JOB_LIST_LIMIT};
use weave_core::models::{Job, JobListQuery, JobStatus};
use weave_core::AppError;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct JobListParams {
    pub project_id: Option<String>,
    /// One of `queued`, `running`, `done`, `failed`.
    pub status: Option<String>,
    /// Defaults to 50, clamped to 1..=200.
    pub limit: Option<i64>,
}

impl JobListParams {
    fn into_query(self) -> Result<JobListQuery, AppError> {
        let status = self
            .status
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<JobStatus>())
            .transpose()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        Ok(JobListQuery {
            project_id: self.project_id.filter(|p| !p.is_empty()),
            status,
            limit: self
                .limit
                .unwrap_or(DEFAULT_JOB_LIST_LIMIT)
                .clamp(1, MAX_JOB_LIST_LIMIT),
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
    pub count: usize,
}

/// Get a job by ID
#[utoipa::path(
    get,
    path = "/v1/job/{id}",
    tag = "jobs",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job record", body = Job),
        (status = 400, description = "Malformed job ID", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, HttpAppError> {
    let job_id = Uuid::parse_str(&id).map_err(AppError::from)?;

    match state.db.jobs.get(job_id).await? {
        Some(job) => Ok(Json(job)),
        None => {
            tracing::debug!(job_id = %job_id, "Job not found");
            Err(AppError::NotFound("Job not found".to_string()).into())
        }
    }
}

/// List jobs, newest first
#[utoipa::path(
    get,
    path = "/v1/jobs",
    tag = "jobs",
    params(JobListParams),
    responses(
        (status = 200, description = "Matching jobs", body = JobListResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<JobListParams>,
) -> Result<Json<JobListResponse>, HttpAppError> {
    let query = params.into_query()?;
    let jobs = state.db.jobs.list(&query).await?;

    Ok(Json(JobListResponse {
        count: jobs.len(),
        jobs,
    }))
}
