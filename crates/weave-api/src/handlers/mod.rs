pub mod health;
pub mod jobs;
pub mod mask;
pub mod outfit;
pub mod upload;

use uuid::Uuid;
use weave_core::models::Upload;
use weave_core::AppError;

use crate::state::AppState;

/// Fetch an upload the request refers to; absent uploads are a 404.
pub(crate) async fn require_upload(state: &AppState, id: Uuid) -> Result<Upload, AppError> {
    state
        .db
        .uploads
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", id)))
}

/// Remove an object whose document could not be written.
pub(crate) fn cleanup_orphan(state: &AppState, key: String) {
    let storage = state.storage.clone();
    tokio::spawn(async move {
        if let Err(e) = storage.delete(&key).await {
            tracing::warn!(
                error = %e,
                storage_key = %key,
                "Failed to cleanup storage object after database error"
            );
        }
    });
}
