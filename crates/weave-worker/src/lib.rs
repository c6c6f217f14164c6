//! Background task queue and worker infrastructure.
//!
//! Provides a polling worker pool over [`weave_db::TaskRepository`] with
//! bounded, backed-off retries, the [`TaskHandlerContext`] trait the API
//! implements to dispatch tasks, and the stale job reaper.

pub mod context;
pub mod queue;
pub mod reaper;

pub use context::TaskHandlerContext;
pub use queue::{TaskQueue, TaskQueueConfig, MAX_RETRY_BACKOFF_SECS};
pub use reaper::{reap_stale_jobs, spawn_stale_job_reaper};
