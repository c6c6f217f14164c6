//! Storage abstraction trait

use crate::StorageBackend;
use async_trait::async_trait;
use thiserror::Error;
use weave_core::AppError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => AppError::NotFound(msg),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::ConfigError(msg) => AppError::Internal(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Object storage used for every binary the service reads or writes.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under `{key_prefix}/{filename}` and return (storage_key, public_url).
    async fn upload(
        &self,
        key_prefix: &str,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<(String, String)>;

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    /// Deleting a missing object is not an error.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    fn backend_type(&self) -> StorageBackend;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        assert!(matches!(
            AppError::from(StorageError::NotFound("k".to_string())),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(StorageError::InvalidKey("../x".to_string())),
            AppError::InvalidInput(_)
        ));
        let err = AppError::from(StorageError::UploadFailed("bucket gone".to_string()));
        assert!(matches!(err, AppError::Storage(ref msg) if msg.contains("bucket gone")));
    }
}
