//! Shared key handling for storage backends.

use crate::traits::{StorageError, StorageResult};

/// Reject keys that could escape the storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains("..") || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Join a caller prefix and a filename into a storage key.
pub fn build_key(key_prefix: &str, filename: &str) -> StorageResult<String> {
    let prefix = key_prefix.trim_matches('/');
    if filename.is_empty() || filename.contains('/') {
        return Err(StorageError::InvalidKey(format!(
            "Invalid filename: {}",
            filename
        )));
    }
    let key = if prefix.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", prefix, filename)
    };
    validate_key(&key)?;
    Ok(key)
}
