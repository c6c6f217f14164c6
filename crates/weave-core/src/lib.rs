//! StyleWeave Core Library
//!
//! Domain models, the job status machine, error types and configuration shared
//! by every StyleWeave crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod task_error;

pub use config::{BaseConfig, Config, WeaveConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
pub use task_error::{TaskError, TaskResultExt};
