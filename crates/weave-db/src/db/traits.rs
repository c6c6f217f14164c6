//! Store abstractions shared by the PostgreSQL and in-memory implementations.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use weave_core::models::{
    Job, JobListQuery, JobUpdate, NewJob, NewTask, NewUpload, StoredImage, Task, Upload,
};
use weave_core::AppError;

#[async_trait]
pub trait UploadRepository: Send + Sync {
    async fn insert(&self, upload: NewUpload) -> Result<Upload, AppError>;

    /// Insert every upload or none of them.
    async fn insert_all(&self, uploads: Vec<NewUpload>) -> Result<Vec<Upload>, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Upload>, AppError>;
}

/// Job documents. Every mutation goes through [`JobRepository::apply`], which
/// enforces the status machine; a refused mutation is
/// `AppError::InvalidStateTransition` and an unknown id is `AppError::NotFound`.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: NewJob) -> Result<Job, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>, AppError>;

    /// Newest first.
    async fn list(&self, query: &JobListQuery) -> Result<Vec<Job>, AppError>;

    async fn apply(&self, id: Uuid, update: JobUpdate) -> Result<Job, AppError>;

    /// Fail running HD jobs not touched since `older_than`. Returns the ids moved to `failed`.
    async fn fail_stale_running(
        &self,
        older_than: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<Uuid>, AppError>;

    /// Cheap round trip used by the readiness probe.
    async fn ping(&self) -> Result<(), AppError>;

    async fn mark_running(&self, id: Uuid, progress: i32) -> Result<Job, AppError> {
        self.apply(id, JobUpdate::Start { progress }).await
    }

    async fn update_progress(&self, id: Uuid, progress: i32) -> Result<Job, AppError> {
        self.apply(id, JobUpdate::Progress(progress)).await
    }

    async fn mark_done(&self, id: Uuid, result: StoredImage) -> Result<Job, AppError> {
        self.apply(id, JobUpdate::Complete(result)).await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Job, AppError> {
        self.apply(id, JobUpdate::Fail(error.to_string())).await
    }
}

/// Dispatch queue backing the worker pool.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn enqueue(&self, task: NewTask) -> Result<Task>;

    /// Atomically move the oldest due `pending` task to `running`.
    async fn claim_next(&self) -> Result<Option<Task>>;

    async fn mark_completed(&self, id: Uuid) -> Result<Task>;

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Task>;

    /// Put the task back to `pending` after `delay_seconds`, incrementing `retry_count`.
    async fn reschedule(&self, id: Uuid, delay_seconds: i64, error: &str) -> Result<Task>;

    async fn get(&self, id: Uuid) -> Result<Option<Task>>;
}
