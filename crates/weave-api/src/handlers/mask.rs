use std::sync::Arc;

use axum::{extract::State, Json};
use bytes::Bytes;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use weave_compositing::codec;
use weave_core::models::{NewUpload, StoredImage, Upload, UploadType};
use weave_core::AppError;

use super::{cleanup_orphan, require_upload};
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;

fn default_auto_refine() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MaskGenerateRequest {
    /// A `model` upload.
    pub upload_id: Uuid,
    /// Recorded on the mask uploads.
    #[serde(default = "default_auto_refine")]
    pub auto_refine: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GeneratedMask {
    pub id: Uuid,
    /// `top` or `bottom`.
    #[serde(rename = "type")]
    pub region: String,
    pub upload: Upload,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MaskGenerateResponse {
    pub masks: Vec<GeneratedMask>,
}

/// Generate top and bottom region masks for a model photo
#[utoipa::path(
    post,
    path = "/v1/mask/generate",
    tag = "masks",
    request_body = MaskGenerateRequest,
    responses(
        (status = 200, description = "Masks generated", body = MaskGenerateResponse),
        (status = 400, description = "Upload is not a model photo", body = ErrorResponse),
        (status = 404, description = "Upload not found", body = ErrorResponse),
        (status = 500, description = "Segmentation or storage failure", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(upload_id = %request.upload_id))]
pub async fn generate_masks(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<MaskGenerateRequest>,
) -> Result<Json<MaskGenerateResponse>, HttpAppError> {
    let model = require_upload(&state, request.upload_id).await?;
    if model.upload_type != UploadType::Model {
        return Err(AppError::InvalidInput(format!(
            "Upload {} has type {}, expected model",
            model.id, model.upload_type
        ))
        .into());
    }

    let image = state.storage.download(&model.file.key).await?;
    let regions = state
        .compositing
        .segmentation
        .generate_masks(Bytes::from(image))
        .await?;

    // Both objects are stored before either document is written, so a
    // failure never leaves a single orphaned mask behind.
    let mut stored = Vec::with_capacity(2);
    for (region, upload_type, mask) in [
        ("top", UploadType::MaskTop, regions.top),
        ("bottom", UploadType::MaskBottom, regions.bottom),
    ] {
        match store_mask(&state, &model, &request, region, upload_type, mask).await {
            Ok(new_upload) => stored.push(new_upload),
            Err(e) => {
                for new_upload in stored {
                    cleanup_orphan(&state, new_upload.file.key);
                }
                return Err(e.into());
            }
        }
    }

    let keys: Vec<String> = stored.iter().map(|upload| upload.file.key.clone()).collect();
    let uploads = match state.db.uploads.insert_all(stored).await {
        Ok(uploads) => uploads,
        Err(e) => {
            for key in keys {
                cleanup_orphan(&state, key);
            }
            return Err(e.into());
        }
    };

    let masks: Vec<GeneratedMask> = ["top", "bottom"]
        .into_iter()
        .zip(uploads)
        .map(|(region, upload)| GeneratedMask {
            id: upload.id,
            region: region.to_string(),
            upload,
        })
        .collect();

    tracing::info!(
        mask_top = %masks[0].id,
        mask_bottom = %masks[1].id,
        "Masks generated"
    );
    Ok(Json(MaskGenerateResponse { masks }))
}

/// Encode and store one mask; returns the document to record for it.
async fn store_mask(
    state: &AppState,
    model: &Upload,
    request: &MaskGenerateRequest,
    region: &str,
    upload_type: UploadType,
    mask: GrayImage,
) -> Result<NewUpload, AppError> {
    let encoded = tokio::task::spawn_blocking(move || codec::encode_mask(&mask))
        .await
        .map_err(|e| AppError::Internal(format!("Mask encode task failed: {}", e)))??;

    let filename = format!("{}_{}.{}", Uuid::new_v4(), region, encoded.format.extension());
    let (key, url) = state
        .storage
        .upload(
            &state.storage_prefix("masks"),
            &filename,
            encoded.format.content_type(),
            encoded.data.to_vec(),
        )
        .await?;

    Ok(NewUpload {
        project_id: model.project_id.clone(),
        upload_type,
        file: StoredImage {
            url,
            key,
            width: encoded.width,
            height: encoded.height,
        },
        metadata: serde_json::json!({
            "source_upload": model.id,
            "auto_refine": request.auto_refine,
            "content_type": encoded.format.content_type(),
            "size": encoded.data.len(),
        }),
    })
}
