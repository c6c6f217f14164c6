//! Health, upload validation and job query integration tests.
//!
//! Run with: `cargo test -p weave-api --test api_test`

mod helpers;

use axum_test::multipart::{MultipartForm, Part};
use helpers::fixtures::{fabric_png, model_png};
use helpers::{setup_test_app, upload_png};
use serde_json::{json, Value};

#[tokio::test]
async fn test_health_endpoints() {
    let app = setup_test_app().await;

    let response = app.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!({ "status": "healthy" }));

    let response = app.server.get("/health/ready").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["database"], "ready");
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = setup_test_app().await;

    let response = app
        .server
        .get("/health")
        .add_header("x-request-id", "req-123")
        .await;
    assert_eq!(response.header("x-request-id"), "req-123");
    assert_eq!(response.header("x-content-type-options"), "nosniff");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = setup_test_app().await;
    let response = app.server.get("/api/openapi.json").await;
    response.assert_status_ok();
    let spec = response.json::<Value>();
    assert!(spec["paths"]["/v1/outfit/generate_hd"].is_object());
}

#[tokio::test]
async fn test_upload_rejects_non_image_content_type() {
    let app = setup_test_app().await;
    let form = MultipartForm::new().add_text("type", "model").add_part(
        "file",
        Part::bytes(b"hello".to_vec())
            .file_name("notes.txt")
            .mime_type("text/plain"),
    );
    let response = app.server.post("/v1/upload").multipart(form).await;
    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_upload_rejects_undecodable_image() {
    let app = setup_test_app().await;
    let form = MultipartForm::new().add_text("type", "model").add_part(
        "file",
        Part::bytes(b"definitely not a png".to_vec())
            .file_name("model.png")
            .mime_type("image/png"),
    );
    let response = app.server.post("/v1/upload").multipart(form).await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_upload_rejects_mask_and_unknown_types() {
    let app = setup_test_app().await;

    for upload_type in ["mask_top", "shoes"] {
        let form = MultipartForm::new().add_text("type", upload_type).add_part(
            "file",
            Part::bytes(model_png())
                .file_name("model.png")
                .mime_type("image/png"),
        );
        let response = app.server.post("/v1/upload").multipart(form).await;
        response.assert_status_bad_request();
    }

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(model_png())
            .file_name("model.png")
            .mime_type("image/png"),
    );
    app.server
        .post("/v1/upload")
        .multipart(form)
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn test_upload_without_project_is_accepted() {
    let app = setup_test_app().await;
    let form = MultipartForm::new().add_text("type", "top_fabric").add_part(
        "file",
        Part::bytes(fabric_png())
            .file_name("swatch.png")
            .mime_type("image/png"),
    );
    let response = app.server.post("/v1/upload").multipart(form).await;
    response.assert_status_ok();
    let upload = &response.json::<Value>()["upload"];
    assert!(upload["project_id"].is_null());
    assert_eq!(upload["metadata"]["original_filename"], "swatch.png");
    assert!(upload["file"]["key"]
        .as_str()
        .unwrap()
        .starts_with("styleweave/top_fabric/"));
}

#[tokio::test]
async fn test_get_job_with_malformed_or_unknown_id() {
    let app = setup_test_app().await;

    let response = app.server.get("/v1/job/not-a-uuid").await;
    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["code"], "INVALID_INPUT");

    let response = app
        .server
        .get(&format!("/v1/job/{}", uuid::Uuid::new_v4()))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_list_jobs_filters_newest_first() {
    let app = setup_test_app().await;
    let server = &app.server;

    let mut ids = Vec::new();
    for project in ["alpha", "alpha", "beta"] {
        let model = upload_png(server, model_png(), "model", project).await;
        let job = server
            .post("/v1/outfit/apply_preview")
            .json(&json!({ "project_id": project, "model_upload_id": model["id"] }))
            .await
            .json::<Value>();
        ids.push(job["id"].clone());
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let alpha = server
        .get("/v1/jobs")
        .add_query_param("project_id", "alpha")
        .await
        .json::<Value>();
    assert_eq!(alpha["count"], 2);
    assert_eq!(alpha["jobs"][0]["id"], ids[1]);
    assert_eq!(alpha["jobs"][1]["id"], ids[0]);

    let limited = server
        .get("/v1/jobs")
        .add_query_param("limit", 1)
        .await
        .json::<Value>();
    assert_eq!(limited["count"], 1);
    assert_eq!(limited["jobs"][0]["id"], ids[2]);

    let queued = server
        .get("/v1/jobs")
        .add_query_param("status", "queued")
        .await
        .json::<Value>();
    assert_eq!(queued["count"], 0);

    let done = server
        .get("/v1/jobs")
        .add_query_param("status", "done")
        .await
        .json::<Value>();
    assert_eq!(done["count"], 3);

    server
        .get("/v1/jobs")
        .add_query_param("status", "paused")
        .await
        .assert_status_bad_request();
}
