//! Background task handlers and their dispatch from the worker pool.

mod hd_render;

pub use hd_render::HdRenderTaskHandler;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use weave_core::constants::DISPATCH_GAVE_UP_ERROR;
use weave_core::models::{HdRenderTaskPayload, JobStatus, Task, TaskType};
use weave_worker::TaskHandlerContext;

use crate::state::AppState;

#[async_trait]
pub trait TaskHandler {
    async fn process(&self, task: &Task, state: Arc<AppState>) -> Result<()>;
}

#[async_trait]
impl TaskHandlerContext for AppState {
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> Result<()> {
        match task.task_type {
            TaskType::HdRender => HdRenderTaskHandler.process(task, self).await,
        }
    }

    /// The dispatcher gave up on the task. A job that is not terminal yet is
    /// failed with the dispatcher's error. A job that never left `queued`
    /// goes straight to `failed` and its error says so.
    async fn on_task_failed(self: Arc<Self>, task: &Task, error: &str) {
        let job_id = match task.task_type {
            TaskType::HdRender => match task.try_payload_as::<HdRenderTaskPayload>() {
                Ok(payload) => payload.job_id,
                Err(e) => {
                    tracing::error!(task_id = %task.id, error = %e, "Failed task has an unreadable payload");
                    return;
                }
            },
        };

        match self.db.jobs.get(job_id).await {
            Ok(Some(job)) if !job.status.is_terminal() => {
                let message = dispatch_failure_message(job.status, error);
                if let Err(e) = self.db.jobs.mark_failed(job_id, &message).await {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to record job failure");
                } else {
                    tracing::warn!(
                        job_id = %job_id,
                        task_id = %task.id,
                        previous_status = %job.status.as_str(),
                        reason = %message,
                        "Job failed by dispatcher"
                    );
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to load job for failed task");
            }
        }
    }
}

fn dispatch_failure_message(status: JobStatus, error: &str) -> String {
    match status {
        JobStatus::Queued => format!("{}: {}", DISPATCH_GAVE_UP_ERROR, error),
        _ => error.to_string(),
    }
}
