//! Upload, mask and preview integration tests.
//!
//! Run with: `cargo test -p weave-api --test outfit_test`

mod helpers;

use std::time::Duration;

use helpers::fixtures::{fabric_png, model_png, SecondMaskFailsStorage, MODEL_HEIGHT, MODEL_WIDTH};
use helpers::{generate_masks, setup_test_app, setup_test_app_with_storage, upload_png};
use serde_json::{json, Value};

#[tokio::test]
async fn test_upload_mask_preview_end_to_end() {
    let app = setup_test_app().await;
    let server = &app.server;

    let model = upload_png(server, model_png(), "model", "summer").await;
    assert_eq!(model["type"], "model");
    assert_eq!(model["project_id"], "summer");
    assert_eq!(model["file"]["width"], MODEL_WIDTH);
    assert_eq!(model["file"]["height"], MODEL_HEIGHT);
    assert_eq!(model["metadata"]["content_type"], "image/png");

    let response = server
        .post("/v1/mask/generate")
        .json(&json!({ "upload_id": model["id"] }))
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    let masks = body["masks"].as_array().unwrap();
    assert_eq!(masks.len(), 2);
    assert_eq!(masks[0]["type"], "top");
    assert_eq!(masks[0]["upload"]["type"], "mask_top");
    assert_eq!(masks[1]["type"], "bottom");
    assert_eq!(masks[1]["upload"]["type"], "mask_bottom");
    for mask in masks {
        assert_eq!(mask["id"], mask["upload"]["id"]);
        assert_eq!(mask["upload"]["project_id"], "summer");
        assert_eq!(mask["upload"]["file"]["width"], MODEL_WIDTH);
        assert_eq!(mask["upload"]["file"]["height"], MODEL_HEIGHT);
        assert_eq!(mask["upload"]["metadata"]["source_upload"], model["id"]);
        assert_eq!(mask["upload"]["metadata"]["auto_refine"], true);
    }

    let fabric = upload_png(server, fabric_png(), "top_fabric", "summer").await;
    let response = server
        .post("/v1/outfit/apply_preview")
        .json(&json!({
            "project_id": "summer",
            "model_upload_id": model["id"],
            "top_fabric_upload_id": fabric["id"],
            "mask_top_id": masks[0]["id"],
        }))
        .await;
    response.assert_status_ok();
    let job = response.json::<Value>();
    assert_eq!(job["type"], "preview");
    assert_eq!(job["status"], "done");
    assert_eq!(job["progress"], 100);
    assert!(job["error"].is_null());
    assert_eq!(job["result"]["width"], MODEL_WIDTH);
    assert_eq!(job["result"]["height"], MODEL_HEIGHT);
    assert!(job["result"]["key"]
        .as_str()
        .unwrap()
        .starts_with("styleweave/previews/"));
    assert_eq!(job["params"]["scale"], 1.0);

    let stored = app
        .state
        .storage
        .download(job["result"]["key"].as_str().unwrap())
        .await
        .unwrap();
    let img = image::load_from_memory(&stored).unwrap();
    assert_eq!((img.width(), img.height()), (MODEL_WIDTH, MODEL_HEIGHT));

    let fetched = server
        .get(&format!("/v1/job/{}", job["id"].as_str().unwrap()))
        .await
        .json::<Value>();
    assert_eq!(fetched["id"], job["id"]);
    assert_eq!(fetched["status"], "done");
}

#[tokio::test]
async fn test_preview_uses_bottom_pair_when_top_is_incomplete() {
    let app = setup_test_app().await;
    let server = &app.server;

    let model = upload_png(server, model_png(), "model", "p1").await;
    let (mask_top, mask_bottom) = generate_masks(server, model["id"].as_str().unwrap()).await;
    let fabric = upload_png(server, fabric_png(), "bottom_fabric", "p1").await;

    let response = server
        .post("/v1/outfit/apply_preview")
        .json(&json!({
            "project_id": "p1",
            "model_upload_id": model["id"],
            "bottom_fabric_upload_id": fabric["id"],
            "mask_top_id": mask_top,
            "mask_bottom_id": mask_bottom,
            "scale": 0.5,
        }))
        .await;
    response.assert_status_ok();
    let job = response.json::<Value>();
    assert_eq!(job["status"], "done");
    assert_eq!(job["result"]["width"], MODEL_WIDTH);
    assert_eq!(job["params"]["scale"], 0.5);
}

#[tokio::test]
async fn test_preview_without_pair_passes_model_through() {
    let app = setup_test_app().await;
    let server = &app.server;

    let model = upload_png(server, model_png(), "model", "p1").await;
    let response = server
        .post("/v1/outfit/apply_preview")
        .json(&json!({ "project_id": "p1", "model_upload_id": model["id"] }))
        .await;
    response.assert_status_ok();
    let job = response.json::<Value>();
    assert_eq!(job["status"], "done");
    assert_eq!(job["result"]["width"], MODEL_WIDTH);
    assert_eq!(job["result"]["height"], MODEL_HEIGHT);

    let stored = app
        .state
        .storage
        .download(job["result"]["key"].as_str().unwrap())
        .await
        .unwrap();
    assert_eq!(stored, model_png());
}

#[tokio::test]
async fn test_preview_with_missing_upload_is_not_found() {
    let app = setup_test_app().await;
    let server = &app.server;

    let model = upload_png(server, model_png(), "model", "p1").await;
    let response = server
        .post("/v1/outfit/apply_preview")
        .json(&json!({
            "project_id": "p1",
            "model_upload_id": model["id"],
            "top_fabric_upload_id": uuid::Uuid::new_v4(),
            "mask_top_id": uuid::Uuid::new_v4(),
        }))
        .await;
    response.assert_status_not_found();
    assert_eq!(response.json::<Value>()["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_preview_rejects_non_positive_scale() {
    let app = setup_test_app().await;
    let server = &app.server;

    let model = upload_png(server, model_png(), "model", "p1").await;
    let response = server
        .post("/v1/outfit/apply_preview")
        .json(&json!({ "project_id": "p1", "model_upload_id": model["id"], "scale": 0.0 }))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_preview_rejects_oversized_scale() {
    let app = setup_test_app().await;
    let server = &app.server;

    let model = upload_png(server, model_png(), "model", "p1").await;
    let fabric = upload_png(server, fabric_png(), "top_fabric", "p1").await;
    let (mask_top, _) = generate_masks(server, model["id"].as_str().unwrap()).await;

    let response = server
        .post("/v1/outfit/apply_preview")
        .json(&json!({
            "project_id": "p1",
            "model_upload_id": model["id"],
            "top_fabric_upload_id": fabric["id"],
            "mask_top_id": mask_top,
            "scale": 100000.0,
        }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["code"], "INVALID_INPUT");

    // The service is still serving after the rejection.
    app.server.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_preview_rejects_malformed_identifier() {
    let app = setup_test_app().await;
    let response = app
        .server
        .post("/v1/outfit/apply_preview")
        .json(&json!({ "project_id": "p1", "model_upload_id": "not-a-uuid" }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_mask_generation_requires_model_upload() {
    let app = setup_test_app().await;
    let server = &app.server;

    let fabric = upload_png(server, fabric_png(), "top_fabric", "p1").await;
    let response = server
        .post("/v1/mask/generate")
        .json(&json!({ "upload_id": fabric["id"] }))
        .await;
    response.assert_status_bad_request();

    let response = server
        .post("/v1/mask/generate")
        .json(&json!({ "upload_id": uuid::Uuid::new_v4() }))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_mask_generation_records_auto_refine_flag() {
    let app = setup_test_app().await;
    let server = &app.server;

    let model = upload_png(server, model_png(), "model", "p1").await;
    let response = server
        .post("/v1/mask/generate")
        .json(&json!({ "upload_id": model["id"], "auto_refine": false }))
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["masks"][0]["upload"]["metadata"]["auto_refine"], false);
}

#[tokio::test]
async fn test_failed_mask_generation_leaves_no_partial_masks() {
    let app = setup_test_app_with_storage(SecondMaskFailsStorage::wrap).await;
    let server = &app.server;

    let model = upload_png(server, model_png(), "model", "p1").await;
    let response = server
        .post("/v1/mask/generate")
        .json(&json!({ "upload_id": model["id"] }))
        .await;
    response.assert_status_internal_server_error();
    assert_eq!(response.json::<Value>()["code"], "STORAGE_ERROR");

    // Only the model document exists.
    assert_eq!(app.uploads.len().await, 1);

    // The stored top mask object is removed in the background.
    let masks_dir = app.storage_dir.path().join("styleweave").join("masks");
    let mut remaining = usize::MAX;
    for _ in 0..50 {
        remaining = match std::fs::read_dir(&masks_dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        };
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 0);
}
