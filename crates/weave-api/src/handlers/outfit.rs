//! Outfit compositing: the synchronous preview and the queued HD render.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;
use weave_compositing::{extension_for, OutputFormat};
use weave_core::models::{
    HdRenderParams, HdRenderTaskPayload, Job, JobStatus, NewJob, PreviewParams, StoredImage,
    Upload,
};
use weave_core::AppError;

use super::{cleanup_orphan, require_upload};
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use crate::workdir::Workdir;

#[derive(Debug, Serialize, ToSchema)]
pub struct HdJobAccepted {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Composite a fabric onto the model photo and return the finished job
///
/// The top pair (fabric and mask) is used when both are given, otherwise the
/// bottom pair. Without a complete pair, or with an empty mask, the model
/// photo itself is stored as the result.
#[utoipa::path(
    post,
    path = "/v1/outfit/apply_preview",
    tag = "outfit",
    request_body = PreviewParams,
    responses(
        (status = 200, description = "Preview job, already done", body = Job),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 404, description = "Referenced upload not found", body = ErrorResponse),
        (status = 500, description = "Compositing or storage failure", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, params), fields(project_id = %params.project_id, model_upload_id = %params.model_upload_id))]
pub async fn apply_preview(
    State(state): State<Arc<AppState>>,
    ValidatedJson(params): ValidatedJson<PreviewParams>,
) -> Result<Json<Job>, HttpAppError> {
    params.validate()?;
    params.check_scale()?;

    let model = require_upload(&state, params.model_upload_id).await?;
    let top_fabric = optional_upload(&state, params.top_fabric_upload_id).await?;
    let bottom_fabric = optional_upload(&state, params.bottom_fabric_upload_id).await?;
    let mask_top = optional_upload(&state, params.mask_top_id).await?;
    let mask_bottom = optional_upload(&state, params.mask_bottom_id).await?;

    let pair = match (top_fabric, mask_top, bottom_fabric, mask_bottom) {
        (Some(fabric), Some(mask), _, _) => Some(("top", fabric, mask)),
        (_, _, Some(fabric), Some(mask)) => Some(("bottom", fabric, mask)),
        _ => None,
    };

    let workdir = Workdir::create("preview")?;
    let model_bytes = workdir
        .read(&workdir.fetch(state.storage.as_ref(), &model, "model").await?)
        .await?;

    let composite = match pair {
        Some((region, fabric, mask)) => {
            let fabric_bytes = workdir
                .read(&workdir.fetch(state.storage.as_ref(), &fabric, "fabric").await?)
                .await?;
            let mask_bytes = workdir
                .read(&workdir.fetch(state.storage.as_ref(), &mask, "mask").await?)
                .await?;
            tracing::debug!(region, fabric_id = %fabric.id, mask_id = %mask.id, "Compositing preview");

            let compositor = state.compositing.texture.clone();
            let scale = params.scale;
            let base = model_bytes.clone();
            tokio::task::spawn_blocking(move || {
                compositor.composite_encoded(
                    &base,
                    &fabric_bytes,
                    &mask_bytes,
                    scale,
                    OutputFormat::Jpeg,
                )
            })
            .await
            .map_err(|e| AppError::Internal(format!("Preview task failed: {}", e)))??
        }
        None => {
            tracing::info!("No complete fabric and mask pair, passing the model photo through");
            None
        }
    };

    let (content_type, extension, data, width, height) = match composite {
        Some(encoded) => (
            encoded.format.content_type().to_string(),
            encoded.format.extension().to_string(),
            encoded.data.to_vec(),
            encoded.width,
            encoded.height,
        ),
        None => {
            let content_type = upload_content_type(&model);
            let extension = extension_for(None, &content_type);
            (
                content_type,
                extension,
                model_bytes,
                model.file.width,
                model.file.height,
            )
        }
    };

    let (key, url) = state
        .storage
        .upload(
            &state.storage_prefix("previews"),
            &format!("{}.{}", Uuid::new_v4(), extension),
            &content_type,
            data,
        )
        .await?;
    drop(workdir);

    let snapshot = serde_json::to_value(&params).map_err(AppError::from)?;
    let result = StoredImage {
        url,
        key: key.clone(),
        width,
        height,
    };
    let job = match state
        .db
        .jobs
        .insert(NewJob::finished_preview(params.project_id.clone(), snapshot, result))
        .await
    {
        Ok(job) => job,
        Err(e) => {
            cleanup_orphan(&state, key);
            return Err(e.into());
        }
    };

    tracing::info!(job_id = %job.id, width, height, "Preview rendered");
    Ok(Json(job))
}

/// Queue an HD render
///
/// Requires at least one fabric and at least one mask. Referenced uploads are
/// resolved by the worker, not here.
#[utoipa::path(
    post,
    path = "/v1/outfit/generate_hd",
    tag = "outfit",
    request_body = HdRenderParams,
    responses(
        (status = 200, description = "Job queued", body = HdJobAccepted),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 500, description = "Job could not be queued", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, params), fields(project_id = %params.project_id))]
pub async fn generate_hd(
    State(state): State<Arc<AppState>>,
    ValidatedJson(params): ValidatedJson<HdRenderParams>,
) -> Result<Json<HdJobAccepted>, HttpAppError> {
    params.validate()?;
    params.check_pairing()?;

    let snapshot = serde_json::to_value(&params).map_err(AppError::from)?;
    let job = state
        .db
        .jobs
        .insert(NewJob::hd_render(params.project_id.clone(), snapshot))
        .await?;

    if let Err(e) = state
        .task_queue
        .submit(&HdRenderTaskPayload { job_id: job.id })
        .await
    {
        tracing::error!(job_id = %job.id, error = %e, "Failed to queue HD render");
        let message = format!("Failed to queue HD render: {}", e);
        if let Err(mark_err) = state.db.jobs.mark_failed(job.id, &message).await {
            tracing::error!(job_id = %job.id, error = %mark_err, "Failed to record queueing failure");
        }
        return Err(AppError::Internal(message).into());
    }

    tracing::info!(job_id = %job.id, "HD render queued");
    Ok(Json(HdJobAccepted {
        job_id: job.id,
        status: job.status,
    }))
}

async fn optional_upload(state: &AppState, id: Option<Uuid>) -> Result<Option<Upload>, AppError> {
    match id {
        Some(id) => require_upload(state, id).await.map(Some),
        None => Ok(None),
    }
}

fn upload_content_type(upload: &Upload) -> String {
    upload
        .metadata
        .get("content_type")
        .and_then(|v| v.as_str())
        .unwrap_or("image/png")
        .to_string()
}
