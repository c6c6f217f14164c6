//! In-memory stores for tests and database-less development runs.
//!
//! They apply the same status machine as the PostgreSQL stores, so handler
//! tests exercise the real transition rules.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;
use weave_core::models::{
    Job, JobListQuery, JobStatus, JobType, JobUpdate, NewJob, NewTask, NewUpload, Task,
    TaskStatus, Upload,
};
use weave_core::AppError;

use crate::db::traits::{JobRepository, TaskRepository, UploadRepository};

#[derive(Clone, Default)]
pub struct MemoryUploadRepository {
    uploads: Arc<RwLock<HashMap<Uuid, Upload>>>,
}

impl MemoryUploadRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UploadRepository for MemoryUploadRepository {
    async fn insert(&self, upload: NewUpload) -> Result<Upload, AppError> {
        let upload = upload.into_upload(Uuid::new_v4(), Utc::now());
        self.uploads
            .write()
            .await
            .insert(upload.id, upload.clone());
        Ok(upload)
    }

    async fn insert_all(&self, uploads: Vec<NewUpload>) -> Result<Vec<Upload>, AppError> {
        let now = Utc::now();
        let uploads: Vec<Upload> = uploads
            .into_iter()
            .map(|upload| upload.into_upload(Uuid::new_v4(), now))
            .collect();
        let mut stored = self.uploads.write().await;
        for upload in &uploads {
            stored.insert(upload.id, upload.clone());
        }
        Ok(uploads)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Upload>, AppError> {
        Ok(self.uploads.read().await.get(&id).cloned())
    }
}

impl MemoryUploadRepository {
    pub async fn len(&self) -> usize {
        self.uploads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.uploads.read().await.is_empty()
    }
}

#[derive(Clone, Default)]
pub struct MemoryJobRepository {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
    /// Every status a job has held, in order. Lets tests assert no state was skipped.
    history: Arc<RwLock<HashMap<Uuid, Vec<JobStatus>>>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status_history(&self, id: Uuid) -> Vec<JobStatus> {
        self.history
            .read()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    async fn record(&self, id: Uuid, status: JobStatus) {
        let mut history = self.history.write().await;
        let entry = history.entry(id).or_default();
        if entry.last() != Some(&status) {
            entry.push(status);
        }
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn insert(&self, job: NewJob) -> Result<Job, AppError> {
        let job = job.into_job(Uuid::new_v4(), Utc::now());
        self.jobs.write().await.insert(job.id, job.clone());
        self.record(job.id, job.status).await;
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, AppError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list(&self, query: &JobListQuery) -> Result<Vec<Job>, AppError> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<Job> = jobs.values().filter(|j| query.matches(j)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matching.truncate(query.limit.max(0) as usize);
        Ok(matching)
    }

    async fn apply(&self, id: Uuid, update: JobUpdate) -> Result<Job, AppError> {
        let updated = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;
            job.apply(update, Utc::now())?;
            job.clone()
        };
        self.record(id, updated.status).await;
        Ok(updated)
    }

    async fn fail_stale_running(
        &self,
        older_than: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<Uuid>, AppError> {
        let mut failed = Vec::new();
        {
            let mut jobs = self.jobs.write().await;
            for job in jobs.values_mut() {
                if job.status == JobStatus::Running
                    && job.job_type == JobType::HdRender
                    && job.updated_at < older_than
                    && job.apply(JobUpdate::Fail(error.to_string()), Utc::now()).is_ok()
                {
                    failed.push(job.id);
                }
            }
        }
        for id in &failed {
            self.record(*id, JobStatus::Failed).await;
        }
        Ok(failed)
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryTaskRepository {
    tasks: Arc<RwLock<HashMap<Uuid, Task>>>,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, id: Uuid, f: F) -> Result<Task>
    where
        F: FnOnce(&mut Task) + Send,
    {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("Task {} not found", id))?;
        f(task);
        task.updated_at = Utc::now();
        Ok(task.clone())
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn enqueue(&self, task: NewTask) -> Result<Task> {
        let task = task.into_task(Uuid::new_v4(), Utc::now());
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(task)
    }

    async fn claim_next(&self) -> Result<Option<Task>> {
        let now = Utc::now();
        let mut tasks = self.tasks.write().await;
        let next = tasks
            .values_mut()
            .filter(|t| t.is_ready_to_run(now))
            .min_by_key(|t| (t.scheduled_at, t.created_at));
        Ok(next.map(|task| {
            task.status = TaskStatus::Running;
            task.started_at = Some(now);
            task.updated_at = now;
            task.clone()
        }))
    }

    async fn mark_completed(&self, id: Uuid) -> Result<Task> {
        self.update(id, |task| {
            task.status = TaskStatus::Completed;
            task.completed_at = Some(Utc::now());
        })
        .await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Task> {
        let error = error.to_string();
        self.update(id, move |task| {
            task.status = TaskStatus::Failed;
            task.last_error = Some(error);
            task.completed_at = Some(Utc::now());
        })
        .await
    }

    async fn reschedule(&self, id: Uuid, delay_seconds: i64, error: &str) -> Result<Task> {
        let error = error.to_string();
        self.update(id, move |task| {
            task.status = TaskStatus::Pending;
            task.retry_count += 1;
            task.last_error = Some(error);
            task.started_at = None;
            task.scheduled_at = Utc::now() + Duration::seconds(delay_seconds);
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }
}
