//! Service initialization and application state setup

use std::sync::{Arc, Weak};
use std::time::Duration;

use weave_compositing::{BlendSettings, TextureCompositor, UploadValidator};
use weave_core::Config;
use weave_inference::{
    GenerativeCompositor, InferenceError, InpaintModel, InpaintParams, ModelSlot,
    SegmentationService, Segmenter,
};
use weave_storage::Storage;
use weave_worker::{spawn_stale_job_reaper, TaskHandlerContext, TaskQueue, TaskQueueConfig};

use super::database::Repositories;
use crate::state::{AppState, CompositingState, DbState};

/// Model slots for the two model-backed services. Nothing is loaded here;
/// each slot loads its model on first use.
pub struct ModelBackends {
    pub segmenter: ModelSlot<Box<dyn Segmenter>>,
    pub inpaint: ModelSlot<Box<dyn InpaintModel>>,
}

impl ModelBackends {
    pub fn from_config(config: &Config) -> Self {
        Self {
            segmenter: segmenter_slot(config),
            inpaint: inpaint_slot(config),
        }
    }
}

#[cfg(feature = "onnx")]
fn segmenter_slot(config: &Config) -> ModelSlot<Box<dyn Segmenter>> {
    use weave_inference::segmentation::onnx::OnnxSegmenter;

    let checkpoint = config.sam_checkpoint().to_string();
    let input_size = config.segmentation_input_size();
    tracing::info!(checkpoint = %checkpoint, input_size, "ONNX segmentation backend configured");
    ModelSlot::new("segmentation", move || {
        OnnxSegmenter::load(&checkpoint, input_size).map(|s| Box::new(s) as Box<dyn Segmenter>)
    })
}

#[cfg(not(feature = "onnx"))]
fn segmenter_slot(_config: &Config) -> ModelSlot<Box<dyn Segmenter>> {
    tracing::warn!("Built without the `onnx` feature, mask generation is unavailable");
    ModelSlot::new("segmentation", || {
        Err(InferenceError::ModelUnavailable(
            "segmentation backend not built (enable the `onnx` feature)".to_string(),
        ))
    })
}

#[cfg(feature = "candle")]
fn inpaint_slot(config: &Config) -> ModelSlot<Box<dyn InpaintModel>> {
    use weave_inference::inpaint::candle::CandleInpaintModel;

    let model_id = config.sd_model_id().to_string();
    let use_cpu = config.sd_use_cpu();
    tracing::info!(model_id = %model_id, use_cpu, "Candle inpainting backend configured");
    ModelSlot::new("inpainting", move || {
        CandleInpaintModel::load(&model_id, use_cpu).map(|m| Box::new(m) as Box<dyn InpaintModel>)
    })
}

#[cfg(not(feature = "candle"))]
fn inpaint_slot(_config: &Config) -> ModelSlot<Box<dyn InpaintModel>> {
    tracing::warn!("Built without the `candle` feature, HD renders will fail");
    ModelSlot::new("inpainting", || {
        Err(InferenceError::ModelUnavailable(
            "inpainting backend not built (enable the `candle` feature)".to_string(),
        ))
    })
}

fn inpaint_defaults(config: &Config) -> InpaintParams {
    InpaintParams {
        guidance_scale: config.sd_guidance_scale(),
        steps: config.sd_steps(),
        strength: config.sd_strength(),
        seed: config.sd_seed(),
    }
}

/// Build the application state, start the worker pool and, when enabled, the
/// stale job reaper.
pub fn assemble_state(
    config: &Config,
    repositories: Repositories,
    storage: Arc<dyn Storage>,
    backends: ModelBackends,
) -> Arc<AppState> {
    let task_queue = TaskQueue::new(
        repositories.tasks.clone(),
        TaskQueueConfig {
            max_workers: config.task_queue_max_workers(),
            poll_interval_ms: config.task_queue_poll_interval_ms(),
            default_timeout_seconds: config.task_queue_timeout_seconds(),
            max_retries: config.task_queue_max_retries(),
        },
    );

    let compositing = CompositingState {
        texture: TextureCompositor::new(BlendSettings {
            max_iterations: config.preview_blend_iterations(),
            ..BlendSettings::default()
        }),
        generative: GenerativeCompositor::new(backends.inpaint, inpaint_defaults(config)),
        segmentation: SegmentationService::new(backends.segmenter),
        validator: UploadValidator::new(config.max_upload_size_bytes()),
    };

    let state = Arc::new(AppState {
        db: DbState {
            uploads: repositories.uploads,
            jobs: repositories.jobs.clone(),
        },
        storage,
        compositing,
        task_queue,
        config: config.clone(),
        is_production: config.is_production(),
    });

    let weak_state = Arc::downgrade(&state);
    let context: Weak<dyn TaskHandlerContext> = weak_state;
    state.task_queue.start(context);
    tracing::info!(
        max_workers = config.task_queue_max_workers(),
        max_retries = config.task_queue_max_retries(),
        "Task queue started"
    );

    let stale_after = config.job_stale_after_seconds();
    if stale_after > 0 {
        let interval = Duration::from_secs((stale_after / 4).clamp(1, 60));
        spawn_stale_job_reaper(
            repositories.jobs,
            Duration::from_secs(stale_after),
            interval,
            state.task_queue.shutdown_signal(),
        );
    } else {
        tracing::info!("Stale job reaper disabled");
    }

    state
}
