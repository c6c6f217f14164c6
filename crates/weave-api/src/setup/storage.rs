//! Object storage setup

use anyhow::{Context, Result};
use std::sync::Arc;
use weave_core::Config;
use weave_storage::Storage;

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    let storage = weave_storage::create_storage(config)
        .await
        .context("Failed to initialize storage backend")?;
    tracing::info!(
        backend = ?storage.backend_type(),
        folder = %config.storage_folder(),
        "Storage initialized"
    );
    Ok(storage)
}
