//! Test helpers: build the real router over in-memory stores, local storage
//! in a temporary directory and stub models.

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::Value;
use tempfile::TempDir;
use weave_api::setup::database::Repositories;
use weave_api::setup::routes::setup_routes;
use weave_api::setup::services::{assemble_state, ModelBackends};
use weave_api::state::AppState;
use weave_core::{Config, WeaveConfig};
use weave_db::{MemoryJobRepository, MemoryTaskRepository, MemoryUploadRepository};
use weave_inference::{InpaintModel, ModelSlot, Segmenter};
use weave_storage::{LocalStorage, Storage};

use fixtures::{BandSegmenter, PaintInpaint};

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub jobs: Arc<MemoryJobRepository>,
    pub uploads: Arc<MemoryUploadRepository>,
    pub storage_dir: TempDir,
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(BandSegmenter, PaintInpaint::default()).await
}

pub async fn setup_test_app_with(
    segmenter: impl Segmenter + 'static,
    inpaint: impl InpaintModel + 'static,
) -> TestApp {
    build_test_app(segmenter, inpaint, |storage| storage).await
}

/// Same as [`setup_test_app`] with the storage wrapped by `wrap_storage`.
pub async fn setup_test_app_with_storage(
    wrap_storage: impl FnOnce(Arc<dyn Storage>) -> Arc<dyn Storage>,
) -> TestApp {
    build_test_app(BandSegmenter, PaintInpaint::default(), wrap_storage).await
}

async fn build_test_app(
    segmenter: impl Segmenter + 'static,
    inpaint: impl InpaintModel + 'static,
    wrap_storage: impl FnOnce(Arc<dyn Storage>) -> Arc<dyn Storage>,
) -> TestApp {
    let storage_dir = TempDir::new().expect("temp dir");
    let base_url = "http://localhost:3000/media".to_string();
    let config = Config(Box::new(WeaveConfig {
        local_storage_path: Some(storage_dir.path().display().to_string()),
        local_storage_base_url: Some(base_url.clone()),
        task_queue_poll_interval_ms: 10,
        job_stale_after_seconds: 0,
        preview_blend_iterations: 50,
        ..WeaveConfig::default()
    }));

    let storage: Arc<dyn Storage> = wrap_storage(Arc::new(
        LocalStorage::new(storage_dir.path(), base_url)
            .await
            .expect("local storage"),
    ));
    let jobs = Arc::new(MemoryJobRepository::new());
    let uploads = Arc::new(MemoryUploadRepository::new());
    let repositories = Repositories {
        uploads: uploads.clone(),
        jobs: jobs.clone(),
        tasks: Arc::new(MemoryTaskRepository::new()),
    };
    let backends = ModelBackends {
        segmenter: ModelSlot::loaded("segmentation", Box::new(segmenter) as Box<dyn Segmenter>),
        inpaint: ModelSlot::loaded("inpainting", Box::new(inpaint) as Box<dyn InpaintModel>),
    };

    let state = assemble_state(&config, repositories, storage, backends);
    let router = setup_routes(&config, state.clone()).expect("routes");
    let server = TestServer::new(router).expect("test server");

    TestApp {
        server,
        state,
        jobs,
        uploads,
        storage_dir,
    }
}

/// Upload `data` as a PNG of the given type and return the upload record.
pub async fn upload_png(server: &TestServer, data: Vec<u8>, upload_type: &str, project_id: &str) -> Value {
    let form = MultipartForm::new()
        .add_text("type", upload_type.to_string())
        .add_text("project_id", project_id.to_string())
        .add_part(
            "file",
            Part::bytes(data)
                .file_name(format!("{}.png", upload_type))
                .mime_type("image/png"),
        );
    let response = server.post("/v1/upload").multipart(form).await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["success"], true);
    body["upload"].clone()
}

/// Generate masks for a model upload; returns (mask_top id, mask_bottom id).
pub async fn generate_masks(server: &TestServer, model_id: &str) -> (String, String) {
    let response = server
        .post("/v1/mask/generate")
        .json(&serde_json::json!({ "upload_id": model_id }))
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    let masks = body["masks"].as_array().expect("masks array");
    assert_eq!(masks.len(), 2);
    (
        masks[0]["id"].as_str().expect("top id").to_string(),
        masks[1]["id"].as_str().expect("bottom id").to_string(),
    )
}

/// Poll `GET /job/{id}` until the job is `done` or `failed`.
pub async fn wait_for_terminal_job(server: &TestServer, job_id: &str) -> Value {
    for _ in 0..500 {
        let job = server.get(&format!("/v1/job/{}", job_id)).await.json::<Value>();
        if job["status"] == "done" || job["status"] == "failed" {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish in time", job_id);
}
