//! Per-request and per-job scratch directories.
//!
//! Inputs are downloaded into a fresh temporary directory that is removed when
//! the [`Workdir`] is dropped, on success and on every error path alike.
//! Removal failures are logged and otherwise ignored.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use weave_core::models::Upload;
use weave_core::AppError;
use weave_storage::Storage;

pub struct Workdir {
    dir: Option<TempDir>,
}

impl Workdir {
    pub fn create(label: &str) -> Result<Self, AppError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("weave-{}-", label))
            .tempdir()
            .map_err(|e| AppError::Internal(format!("Failed to create working directory: {}", e)))?;
        tracing::debug!(path = %dir.path().display(), "Created working directory");
        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }

    /// Download `upload`'s binary into the directory as `name`.
    pub async fn fetch(
        &self,
        storage: &dyn Storage,
        upload: &Upload,
        name: &str,
    ) -> Result<PathBuf, AppError> {
        let data = storage.download(&upload.file.key).await?;
        let path = self.path().join(name);
        tokio::fs::write(&path, &data).await?;
        tracing::debug!(
            upload_id = %upload.id,
            path = %path.display(),
            size_bytes = data.len(),
            "Fetched input"
        );
        Ok(path)
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, AppError> {
        Ok(tokio::fs::read(path).await?)
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove working directory");
            }
        }
    }
}
