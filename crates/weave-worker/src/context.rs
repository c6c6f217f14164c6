//! Task handler context trait
//!
//! The API implements this trait for its application state. The worker calls
//! `dispatch_task` when processing a task; the implementation matches on task
//! type and invokes the appropriate handler.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use weave_core::models::Task;

/// Context for task dispatch.
///
/// Implemented by the API's application state. The worker holds a weak
/// reference and calls `dispatch_task` when processing a claimed task.
#[async_trait]
pub trait TaskHandlerContext: Send + Sync {
    /// Run the task. Return a [`weave_core::TaskError`] to control retries;
    /// any other error is treated as recoverable.
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> Result<()>;

    /// Called once when the dispatcher gives up on a task (unrecoverable
    /// error, retries exhausted or timeout).
    async fn on_task_failed(self: Arc<Self>, _task: &Task, _error: &str) {}
}
