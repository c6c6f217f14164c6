use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;
use weave_compositing::extension_for;
use weave_core::models::{NewUpload, StoredImage, Upload, UploadType};
use weave_core::AppError;

use super::cleanup_orphan;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub upload: Upload,
}

/// Parsed multipart body of `POST /upload`.
#[derive(Debug)]
struct UploadForm {
    data: Bytes,
    filename: Option<String>,
    content_type: String,
    project_id: Option<String>,
    upload_type: UploadType,
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::InvalidInput(format!("Invalid multipart body: {}", err.body_text()))
    }
}

async fn read_form(multipart: &mut Multipart) -> Result<UploadForm, AppError> {
    let mut file: Option<(Bytes, Option<String>, String)> = None;
    let mut project_id = None;
    let mut upload_type = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().map(String::from);
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some((data, filename, content_type));
            }
            Some("project_id") => {
                let value = field.text().await.map_err(multipart_error)?;
                let value = value.trim();
                if !value.is_empty() {
                    project_id = Some(value.to_string());
                }
            }
            Some("type") => {
                let value = field.text().await.map_err(multipart_error)?;
                let parsed = value
                    .trim()
                    .parse::<UploadType>()
                    .map_err(|e| AppError::InvalidInput(e.to_string()))?;
                if !parsed.is_client_uploadable() {
                    return Err(AppError::InvalidInput(format!(
                        "Upload type must be one of model, top_fabric, bottom_fabric; got {}",
                        parsed
                    )));
                }
                upload_type = Some(parsed);
            }
            _ => {}
        }
    }

    let (data, filename, content_type) =
        file.ok_or_else(|| AppError::InvalidInput("Missing file field".to_string()))?;
    let upload_type =
        upload_type.ok_or_else(|| AppError::InvalidInput("Missing type field".to_string()))?;

    Ok(UploadForm {
        data,
        filename,
        content_type,
        project_id,
        upload_type,
    })
}

/// Upload an input image
///
/// Multipart fields: `file` (required), `type` (`model`, `top_fabric` or
/// `bottom_fabric`) and an optional `project_id`.
#[utoipa::path(
    post,
    path = "/v1/upload",
    tag = "uploads",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, multipart), fields(operation = "upload_image"))]
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, HttpAppError> {
    let form = read_form(&mut multipart).await?;
    let (width, height) = state
        .compositing
        .validator
        .validate(&form.content_type, &form.data)?;

    let size = form.data.len();
    let filename = format!(
        "{}.{}",
        Uuid::new_v4(),
        extension_for(form.filename.as_deref(), &form.content_type)
    );
    let (key, url) = state
        .storage
        .upload(
            &state.storage_prefix(form.upload_type.as_str()),
            &filename,
            &form.content_type,
            form.data.to_vec(),
        )
        .await?;

    let new_upload = NewUpload {
        project_id: form.project_id,
        upload_type: form.upload_type,
        file: StoredImage {
            url,
            key: key.clone(),
            width,
            height,
        },
        metadata: serde_json::json!({
            "original_filename": form.filename,
            "content_type": form.content_type,
            "size": size,
        }),
    };
    let upload = match state.db.uploads.insert(new_upload).await {
        Ok(upload) => upload,
        Err(e) => {
            cleanup_orphan(&state, key);
            return Err(e.into());
        }
    };

    tracing::info!(
        upload_id = %upload.id,
        upload_type = %upload.upload_type,
        width,
        height,
        size_bytes = size,
        "Upload stored"
    );

    Ok(Json(UploadResponse {
        success: true,
        upload,
    }))
}
