//! StyleWeave Database Layer
//!
//! The document store for uploads and jobs plus the dispatch task table.
//! Each store is a trait with a PostgreSQL implementation; in-memory
//! implementations are available behind the `memory` feature.

pub mod db;

pub use db::postgres::{PostgresJobRepository, PostgresTaskRepository, PostgresUploadRepository};
pub use db::traits::{JobRepository, TaskRepository, UploadRepository};

#[cfg(feature = "memory")]
pub use db::memory::{MemoryJobRepository, MemoryTaskRepository, MemoryUploadRepository};
