//! Task queue: polling worker pool, retry with backoff, and submission.
//!
//! Shutdown: [`TaskQueue::shutdown`] signals the pool to stop claiming; it
//! does not cancel in-flight tasks.

use anyhow::{Context, Result};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use weave_core::models::{NewTask, Task, TaskPayload};
use weave_core::TaskError;
use weave_db::TaskRepository;

use crate::context::TaskHandlerContext;

/// Maximum delay in seconds before retrying a failed task. Caps exponential backoff
/// so that high retry counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for a given retry count (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(retry_count: i32) -> u64 {
    2_u64
        .checked_pow(retry_count.max(0) as u32)
        .unwrap_or(MAX_RETRY_BACKOFF_SECS)
        .min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub default_timeout_seconds: i32,
    pub max_retries: i32,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 1,
            poll_interval_ms: 1000,
            default_timeout_seconds: 1800,
            max_retries: 3,
        }
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    repository: Arc<dyn TaskRepository>,
    config: TaskQueueConfig,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl TaskQueue {
    /// Create a queue. Tasks can be submitted right away; nothing runs them
    /// until [`TaskQueue::start`] is called.
    pub fn new(repository: Arc<dyn TaskRepository>, config: TaskQueueConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            repository,
            config,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    pub fn config(&self) -> &TaskQueueConfig {
        &self.config
    }

    /// Spawn the worker pool. The pool holds only a weak reference to the
    /// context and stops dispatching once it is dropped.
    pub fn start(&self, context: Weak<dyn TaskHandlerContext>) -> JoinHandle<()> {
        let repository = self.repository.clone();
        let config = self.config.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            Self::worker_pool(repository, config, context, shutdown_rx).await;
        })
    }

    /// Receiver flipped to `true` on shutdown, for background loops tied to the queue.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Submit a new task to the queue.
    #[tracing::instrument(skip(self, payload), fields(task_type = %P::TASK_TYPE))]
    pub async fn submit<P: TaskPayload + Sync>(&self, payload: &P) -> Result<Uuid> {
        let new_task = NewTask::for_payload(
            payload,
            self.config.max_retries,
            Some(self.config.default_timeout_seconds),
        )
        .context("Failed to serialize task payload")?;

        let task = self.repository.enqueue(new_task).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to create task in repository");
            anyhow::anyhow!("Failed to create task in repository: {}", e)
        })?;

        tracing::info!(
            task_id = %task.id,
            task_type = %task.task_type,
            "Task submitted to queue"
        );

        Ok(task.id)
    }

    async fn worker_pool(
        repository: Arc<dyn TaskRepository>,
        config: TaskQueueConfig,
        context: Weak<dyn TaskHandlerContext>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            "Task queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Task queue worker pool shutting down");
                        break;
                    }
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(&repository, &semaphore, &context).await;
                }
            }
        }

        tracing::info!("Task queue worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        repository: &Arc<dyn TaskRepository>,
        semaphore: &Arc<Semaphore>,
        context: &Weak<dyn TaskHandlerContext>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match repository.claim_next().await {
            Ok(Some(task)) => {
                let repo = repository.clone();
                let ctx = context.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = Self::process_task_with_retry(task, repo, ctx).await {
                        tracing::error!(error = %e, "Task processing failed");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No tasks available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim task from queue");
            }
        }
    }

    #[tracing::instrument(skip(repository, context), fields(task.id = %task.id, task.type = %task.task_type))]
    async fn process_task_with_retry(
        task: Task,
        repository: Arc<dyn TaskRepository>,
        context: Weak<dyn TaskHandlerContext>,
    ) -> Result<()> {
        let ctx = context.upgrade().ok_or_else(|| {
            anyhow::anyhow!("TaskHandlerContext was dropped, cannot process task")
        })?;

        let timeout_duration = task
            .timeout_seconds
            .map(|s| Duration::from_secs(s.max(1) as u64))
            .unwrap_or(Duration::from_secs(3600));

        let result = tokio::time::timeout(timeout_duration, ctx.clone().dispatch_task(&task)).await;

        match result {
            Ok(Ok(())) => {
                repository
                    .mark_completed(task.id)
                    .await
                    .context("Failed to mark task as completed")?;
                tracing::info!(task_id = %task.id, task_type = %task.task_type, "Task completed successfully");
                Ok(())
            }
            Ok(Err(e)) => {
                let is_unrecoverable = e
                    .downcast_ref::<TaskError>()
                    .map(|te| !te.is_recoverable())
                    .unwrap_or(false);

                tracing::error!(
                    task_id = %task.id,
                    error = %e,
                    retry_count = task.retry_count,
                    max_retries = task.max_retries,
                    unrecoverable = is_unrecoverable,
                    "Task execution failed"
                );

                if !is_unrecoverable && task.can_retry() {
                    let backoff_seconds = compute_retry_backoff_seconds(task.retry_count);
                    tracing::info!(
                        task_id = %task.id,
                        retry_count = task.retry_count + 1,
                        backoff_seconds = backoff_seconds,
                        "Scheduling task retry"
                    );
                    repository
                        .reschedule(task.id, backoff_seconds as i64, &e.to_string())
                        .await
                        .context("Failed to reschedule task")?;
                    return Ok(());
                }

                let message = e.to_string();
                repository
                    .mark_failed(task.id, &message)
                    .await
                    .context("Failed to mark task as failed")?;
                ctx.on_task_failed(&task, &message).await;
                if is_unrecoverable {
                    tracing::error!(task_id = %task.id, "Task failed with unrecoverable error, will not retry");
                } else {
                    tracing::error!(task_id = %task.id, "Task failed after max retries");
                }
                Err(e)
            }
            Err(_) => {
                // The handler may already have moved its job to `running`, so a
                // timed-out task is never re-run.
                let message = format!(
                    "Task execution timed out after {} seconds",
                    timeout_duration.as_secs()
                );
                tracing::error!(
                    task_id = %task.id,
                    timeout_seconds = ?task.timeout_seconds,
                    "Task execution timed out"
                );
                repository
                    .mark_failed(task.id, &message)
                    .await
                    .context("Failed to mark task as failed")?;
                ctx.on_task_failed(&task, &message).await;
                Err(anyhow::anyhow!(message))
            }
        }
    }

    /// Signals the worker pool to stop claiming new tasks and exit the main loop.
    ///
    /// Returns immediately; already-spawned task handlers run until they
    /// complete or time out.
    pub fn shutdown(&self) {
        tracing::info!("Initiating task queue shutdown");
        let _ = self.shutdown_tx.send(true);
    }
}
