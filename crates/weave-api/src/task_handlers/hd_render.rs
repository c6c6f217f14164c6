//! HD render task: drives one job through `running` to `done` or `failed`.
//!
//! Before the job is marked running, faults leave it queued and are reported
//! as recoverable so the dispatcher may retry. Once running, every fault is
//! written to the job verbatim and reported as unrecoverable: a failed job is
//! terminal and must never be picked up again.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use image::{GrayImage, RgbImage};
use uuid::Uuid;
use weave_compositing::{codec, mask, OutputFormat};
use weave_core::models::{
    HdRenderParams, HdRenderTaskPayload, Job, StoredImage, Task, Upload, PROGRESS_COMPUTED,
    PROGRESS_INPUTS_FETCHED, PROGRESS_INPUTS_VALIDATED,
};
use weave_core::{AppError, TaskError};
use weave_inference::RegionPair;

use super::TaskHandler;
use crate::state::AppState;
use crate::workdir::Workdir;

pub struct HdRenderTaskHandler;

#[async_trait]
impl TaskHandler for HdRenderTaskHandler {
    #[tracing::instrument(skip(self, task, state), fields(task.id = %task.id, job.id = tracing::field::Empty))]
    async fn process(&self, task: &Task, state: Arc<AppState>) -> Result<()> {
        let payload: HdRenderTaskPayload = task
            .try_payload_as()
            .map_err(|e| TaskError::unrecoverable(anyhow::anyhow!("Invalid HD render payload: {}", e)))?;
        let job_id = payload.job_id;
        tracing::Span::current().record("job.id", job_id.to_string());

        let job = match state
            .db
            .jobs
            .mark_running(job_id, PROGRESS_INPUTS_VALIDATED)
            .await
        {
            Ok(job) => job,
            Err(e @ (AppError::NotFound(_) | AppError::InvalidStateTransition(_))) => {
                tracing::warn!(error = %e, "HD render job cannot be started");
                return Err(TaskError::unrecoverable(e).into());
            }
            Err(e) => return Err(TaskError::recoverable(e).into()),
        };
        tracing::info!(project_id = %job.project_id, "HD render started");

        if let Err(e) = render(&job, &state).await {
            let message = e.to_string();
            tracing::error!(error = %e.detailed_message(), "HD render failed");
            if let Err(mark_err) = state.db.jobs.mark_failed(job_id, &message).await {
                tracing::error!(error = %mark_err, "Failed to record HD render failure");
            }
            return Err(TaskError::unrecoverable(e).into());
        }

        tracing::info!("HD render finished");
        Ok(())
    }
}

/// Everything after `running`: fetch, inpaint, store, complete.
async fn render(job: &Job, state: &AppState) -> Result<(), AppError> {
    let params: HdRenderParams = serde_json::from_value(job.params.clone())
        .map_err(|e| AppError::InvalidInput(format!("Invalid job parameters: {}", e)))?;

    let model = state
        .db
        .uploads
        .get(params.model_upload_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Model upload {} not found", params.model_upload_id))
        })?;
    let top_fabric = optional_upload(state, params.top_fabric_upload_id, "top fabric").await?;
    let bottom_fabric =
        optional_upload(state, params.bottom_fabric_upload_id, "bottom fabric").await?;
    let mask_top = optional_upload(state, params.mask_top_id, "top mask").await?;
    let mask_bottom = optional_upload(state, params.mask_bottom_id, "bottom mask").await?;

    let workdir = Workdir::create(&format!("hd-{}", job.id))?;
    let storage = state.storage.as_ref();
    let model_bytes = workdir
        .read(&workdir.fetch(storage, &model, "model").await?)
        .await?;
    let top = fetch_pair(&workdir, state, top_fabric.as_ref(), mask_top.as_ref(), "top").await?;
    let bottom = fetch_pair(
        &workdir,
        state,
        bottom_fabric.as_ref(),
        mask_bottom.as_ref(),
        "bottom",
    )
    .await?;
    state
        .db
        .jobs
        .update_progress(job.id, PROGRESS_INPUTS_FETCHED)
        .await?;

    let (base, top, bottom) = tokio::task::spawn_blocking(move || decode_inputs(model_bytes, top, bottom))
        .await
        .map_err(|e| AppError::Internal(format!("Decode task failed: {}", e)))??;
    if top.is_none() && bottom.is_none() {
        tracing::warn!("No complete fabric and mask pair available, result equals the model image");
    }

    let prompt = params.effective_prompt();
    let output = state
        .compositing
        .generative
        .render(
            base,
            top,
            bottom,
            prompt,
            state.compositing.generative.defaults().clone(),
        )
        .await?;
    state.db.jobs.update_progress(job.id, PROGRESS_COMPUTED).await?;

    let encoded = tokio::task::spawn_blocking(move || codec::encode_rgb(&output, OutputFormat::Png))
        .await
        .map_err(|e| AppError::Internal(format!("Encode task failed: {}", e)))??;
    let filename = format!("{}.{}", job.id, encoded.format.extension());
    let prefix = state.storage_prefix(&format!("results/{}", key_segment(&job.project_id)));
    let (key, url) = storage
        .upload(
            &prefix,
            &filename,
            encoded.format.content_type(),
            encoded.data.to_vec(),
        )
        .await?;

    state
        .db
        .jobs
        .mark_done(
            job.id,
            StoredImage {
                url,
                key,
                width: encoded.width,
                height: encoded.height,
            },
        )
        .await?;
    Ok(())
}

/// Optional inputs that no longer exist are treated as absent.
async fn optional_upload(
    state: &AppState,
    id: Option<Uuid>,
    label: &str,
) -> Result<Option<Upload>, AppError> {
    let Some(id) = id else { return Ok(None) };
    let upload = state.db.uploads.get(id).await?;
    if upload.is_none() {
        tracing::warn!(upload_id = %id, input = label, "Referenced upload not found, ignoring it");
    }
    Ok(upload)
}

struct RawPair {
    fabric: Vec<u8>,
    mask: Vec<u8>,
}

async fn fetch_pair(
    workdir: &Workdir,
    state: &AppState,
    fabric: Option<&Upload>,
    mask: Option<&Upload>,
    region: &str,
) -> Result<Option<RawPair>, AppError> {
    let (Some(fabric), Some(mask)) = (fabric, mask) else {
        return Ok(None);
    };
    let storage = state.storage.as_ref();
    let fabric_path = workdir
        .fetch(storage, fabric, &format!("{}_fabric", region))
        .await?;
    let mask_path = workdir
        .fetch(storage, mask, &format!("mask_{}", region))
        .await?;
    Ok(Some(RawPair {
        fabric: workdir.read(&fabric_path).await?,
        mask: workdir.read(&mask_path).await?,
    }))
}

type DecodedInputs = (RgbImage, Option<RegionPair>, Option<RegionPair>);

fn decode_inputs(
    model: Vec<u8>,
    top: Option<RawPair>,
    bottom: Option<RawPair>,
) -> Result<DecodedInputs, AppError> {
    let base = codec::decode_rgb(&model)?;
    let (width, height) = base.dimensions();
    let decode_pair = |raw: Option<RawPair>| -> Result<Option<RegionPair>, AppError> {
        let Some(raw) = raw else { return Ok(None) };
        let region: GrayImage = mask::binarize(&mask::fit_to(
            &codec::decode_luma(&raw.mask)?,
            width,
            height,
        ));
        Ok(Some(RegionPair {
            fabric: codec::decode_rgb(&raw.fabric)?,
            mask: region,
        }))
    };
    Ok((base, decode_pair(top)?, decode_pair(bottom)?))
}

/// Project ids are free-form; keep storage keys to a safe alphabet.
fn key_segment(project_id: &str) -> String {
    project_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
