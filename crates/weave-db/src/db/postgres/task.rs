use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;
use weave_core::models::{NewTask, Task};

use crate::db::traits::TaskRepository;

const TASK_COLUMNS: &str = r#"
    id,
    task_type,
    status,
    payload,
    scheduled_at,
    started_at,
    completed_at,
    retry_count,
    max_retries,
    timeout_seconds,
    last_error,
    created_at,
    updated_at
"#;

#[derive(Clone)]
pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    #[tracing::instrument(skip(self, task), fields(task_type = %task.task_type))]
    async fn enqueue(&self, task: NewTask) -> Result<Task> {
        let sql = format!(
            r#"
            INSERT INTO tasks (task_type, status, payload, max_retries, timeout_seconds)
            VALUES ($1, 'pending', $2, $3, $4)
            RETURNING {}
            "#,
            TASK_COLUMNS
        );

        let created = sqlx::query_as::<Postgres, Task>(&sql)
            .bind(task.task_type.to_string())
            .bind(&task.payload)
            .bind(task.max_retries)
            .bind(task.timeout_seconds)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to insert task into database");
                anyhow::anyhow!("Failed to insert task into database: {}", e)
            })?;

        tracing::info!(task_id = %created.id, task_type = %created.task_type, "Task created");
        Ok(created)
    }

    /// Claims under `FOR UPDATE SKIP LOCKED` so concurrent workers never share a task.
    #[tracing::instrument(skip(self))]
    async fn claim_next(&self) -> Result<Option<Task>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let next: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM tasks
            WHERE status = 'pending' AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch next task")?;

        let Some(id) = next else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        let sql = format!(
            r#"
            UPDATE tasks
            SET status = 'running', started_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        );
        let claimed = sqlx::query_as::<Postgres, Task>(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to update task status")?;

        tx.commit().await.context("Failed to commit transaction")?;

        tracing::debug!(task_id = %claimed.id, task_type = %claimed.task_type, "Task claimed");
        Ok(Some(claimed))
    }

    #[tracing::instrument(skip(self))]
    async fn mark_completed(&self, id: Uuid) -> Result<Task> {
        let sql = format!(
            r#"
            UPDATE tasks
            SET status = 'completed', completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        );
        sqlx::query_as::<Postgres, Task>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to mark task completed")
    }

    #[tracing::instrument(skip(self))]
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Task> {
        let sql = format!(
            r#"
            UPDATE tasks
            SET status = 'failed', last_error = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        );
        sqlx::query_as::<Postgres, Task>(&sql)
            .bind(id)
            .bind(error)
            .fetch_one(&self.pool)
            .await
            .context("Failed to mark task failed")
    }

    #[tracing::instrument(skip(self))]
    async fn reschedule(&self, id: Uuid, delay_seconds: i64, error: &str) -> Result<Task> {
        let sql = format!(
            r#"
            UPDATE tasks
            SET status = 'pending',
                retry_count = retry_count + 1,
                last_error = $3,
                started_at = NULL,
                scheduled_at = NOW() + make_interval(secs => $2),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        );
        sqlx::query_as::<Postgres, Task>(&sql)
            .bind(id)
            .bind(delay_seconds as f64)
            .bind(error)
            .fetch_one(&self.pool)
            .await
            .context("Failed to reschedule task")
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS);
        sqlx::query_as::<Postgres, Task>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch task")
    }
}
