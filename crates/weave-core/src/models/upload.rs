use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadType {
    Model,
    TopFabric,
    BottomFabric,
    MaskTop,
    MaskBottom,
}

impl UploadType {
    /// Masks are produced by `/mask/generate`, never uploaded directly.
    pub fn is_client_uploadable(&self) -> bool {
        matches!(
            self,
            UploadType::Model | UploadType::TopFabric | UploadType::BottomFabric
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadType::Model => "model",
            UploadType::TopFabric => "top_fabric",
            UploadType::BottomFabric => "bottom_fabric",
            UploadType::MaskTop => "mask_top",
            UploadType::MaskBottom => "mask_bottom",
        }
    }
}

impl Display for UploadType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(UploadType::Model),
            "top_fabric" => Ok(UploadType::TopFabric),
            "bottom_fabric" => Ok(UploadType::BottomFabric),
            "mask_top" => Ok(UploadType::MaskTop),
            "mask_bottom" => Ok(UploadType::MaskBottom),
            _ => Err(anyhow::anyhow!("Invalid upload type: {}", s)),
        }
    }
}

/// Reference to a binary held by the storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StoredImage {
    pub url: String,
    pub key: String,
    pub width: u32,
    pub height: u32,
}

/// Stored input image. Immutable once inserted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Upload {
    pub id: Uuid,
    pub project_id: Option<String>,
    #[serde(rename = "type")]
    pub upload_type: UploadType,
    pub file: StoredImage,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUpload {
    pub project_id: Option<String>,
    pub upload_type: UploadType,
    pub file: StoredImage,
    pub metadata: serde_json::Value,
}

impl NewUpload {
    pub fn into_upload(self, id: Uuid, created_at: DateTime<Utc>) -> Upload {
        Upload {
            id,
            project_id: self.project_id,
            upload_type: self.upload_type,
            file: self.file,
            metadata: self.metadata,
            created_at,
        }
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Upload {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Upload {
            id: row.get("id"),
            project_id: row.get("project_id"),
            upload_type: row.get::<String, _>("upload_type").parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse upload_type: {}", e).into())
            })?,
            file: StoredImage {
                url: row.get("url"),
                key: row.get("storage_key"),
                width: row.get::<i32, _>("width").max(0) as u32,
                height: row.get::<i32, _>("height").max(0) as u32,
            },
            metadata: row.get("metadata"),
            created_at: row.get("created_at"),
        })
    }
}
