//! Request bodies for the outfit endpoints. They double as the parameter
//! snapshot stored on the job they create.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::constants::{DEFAULT_HD_PROMPT, MAX_PREVIEW_SCALE};
use crate::error::AppError;

fn default_scale() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct PreviewParams {
    #[validate(length(min = 1, max = 128))]
    pub project_id: String,
    pub model_upload_id: Uuid,
    pub top_fabric_upload_id: Option<Uuid>,
    pub bottom_fabric_upload_id: Option<Uuid>,
    pub mask_top_id: Option<Uuid>,
    pub mask_bottom_id: Option<Uuid>,
    /// Swatch scale applied after tiling.
    #[serde(default = "default_scale")]
    #[validate(range(exclusive_min = 0.0, max = 16.0))]
    pub scale: f32,
}

impl PreviewParams {
    pub fn check_scale(&self) -> Result<(), AppError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(AppError::InvalidInput(format!(
                "scale must be a positive number, got {}",
                self.scale
            )));
        }
        if self.scale > MAX_PREVIEW_SCALE {
            return Err(AppError::InvalidInput(format!(
                "scale must be at most {}, got {}",
                MAX_PREVIEW_SCALE, self.scale
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct HdRenderParams {
    #[validate(length(min = 1, max = 128))]
    pub project_id: String,
    pub model_upload_id: Uuid,
    pub top_fabric_upload_id: Option<Uuid>,
    pub bottom_fabric_upload_id: Option<Uuid>,
    pub mask_top_id: Option<Uuid>,
    pub mask_bottom_id: Option<Uuid>,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub prompt: Option<String>,
}

impl HdRenderParams {
    /// An HD render needs at least one fabric and at least one mask.
    pub fn check_pairing(&self) -> Result<(), AppError> {
        if self.top_fabric_upload_id.is_none() && self.bottom_fabric_upload_id.is_none() {
            return Err(AppError::InvalidInput(
                "At least one of top_fabric_upload_id or bottom_fabric_upload_id is required"
                    .to_string(),
            ));
        }
        if self.mask_top_id.is_none() && self.mask_bottom_id.is_none() {
            return Err(AppError::InvalidInput(
                "At least one of mask_top_id or mask_bottom_id is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn effective_prompt(&self) -> &str {
        match self.prompt.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => DEFAULT_HD_PROMPT,
        }
    }
}
