//! StyleWeave Storage Library
//!
//! Object storage for uploads, masks, previews and HD results, with an S3
//! backend (via `object_store`) and a local filesystem backend.
//!
//! # Storage key format
//!
//! Keys are `{prefix}/{filename}` where the prefix is chosen by the caller,
//! e.g. `styleweave/masks` or `styleweave/results/{project_id}`. Keys must not
//! contain `..` or start with `/`; both backends share the checks in `keys`.

pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
pub use weave_core::StorageBackend;
