use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;
use weave_core::models::{
    Job, JobListQuery, JobUpdate, NewJob, TransitionRejected, PROGRESS_COMPLETE,
};
use weave_core::AppError;

use crate::db::traits::JobRepository;

const JOB_COLUMNS: &str =
    "id, project_id, job_type, status, progress, params, result, error, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explain why a guarded update touched no row.
    async fn refusal(&self, id: Uuid, attempted: &'static str) -> AppError {
        match self.get(id).await {
            Ok(Some(job)) => TransitionRejected {
                job_id: id,
                status: job.status,
                progress: job.progress,
                attempted,
            }
            .into(),
            Ok(None) => AppError::NotFound(format!("Job {} not found", id)),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    #[tracing::instrument(skip(self, job), fields(job_type = %job.job_type))]
    async fn insert(&self, job: NewJob) -> Result<Job, AppError> {
        let result = job
            .result
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let sql = format!(
            r#"
            INSERT INTO jobs (project_id, job_type, status, progress, params, result)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let row = sqlx::query_as::<Postgres, Job>(&sql)
            .bind(&job.project_id)
            .bind(job.job_type.to_string())
            .bind(job.status.as_str())
            .bind(job.progress)
            .bind(&job.params)
            .bind(result)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, project_id = %job.project_id, "Failed to insert job");
                AppError::Database(e)
            })?;

        tracing::info!(job_id = %row.id, status = %row.status, "Job created");
        Ok(row)
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Job>, AppError> {
        let sql = format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS);
        let row = sqlx::query_as::<Postgres, Job>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self, query: &JobListQuery) -> Result<Vec<Job>, AppError> {
        let mut sql = format!("SELECT {} FROM jobs WHERE TRUE", JOB_COLUMNS);
        let mut bind_count = 1;

        if query.project_id.is_some() {
            sql.push_str(&format!(" AND project_id = ${}", bind_count));
            bind_count += 1;
        }
        if query.status.is_some() {
            sql.push_str(&format!(" AND status = ${}", bind_count));
            bind_count += 1;
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC, id DESC LIMIT ${}",
            bind_count
        ));

        let mut query_builder = sqlx::query_as::<Postgres, Job>(&sql);
        if let Some(ref project_id) = query.project_id {
            query_builder = query_builder.bind(project_id);
        }
        if let Some(status) = query.status {
            query_builder = query_builder.bind(status.as_str());
        }
        let rows = query_builder
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    #[tracing::instrument(skip(self, update))]
    async fn apply(&self, id: Uuid, update: JobUpdate) -> Result<Job, AppError> {
        // Each statement carries the status machine guard in its WHERE clause.
        let (sql_set, guard, attempted) = match &update {
            JobUpdate::Start { .. } => (
                "status = 'running', progress = GREATEST(progress, LEAST(GREATEST($2, 0), 100))",
                "status IN ('queued', 'running')",
                "start",
            ),
            JobUpdate::Progress(progress) => {
                if !(0..=PROGRESS_COMPLETE).contains(progress) {
                    return Err(self.refusal(id, "report progress").await);
                }
                (
                    "progress = $2",
                    "status = 'running' AND progress <= $2",
                    "report progress",
                )
            }
            JobUpdate::Complete(_) => (
                "status = 'done', progress = 100, result = $2",
                "status = 'running'",
                "complete",
            ),
            JobUpdate::Fail(_) => (
                "status = 'failed', error = $2",
                "status IN ('queued', 'running')",
                "fail",
            ),
        };

        let sql = format!(
            "UPDATE jobs SET {}, updated_at = NOW() WHERE id = $1 AND {} RETURNING {}",
            sql_set, guard, JOB_COLUMNS
        );
        let query = sqlx::query_as::<Postgres, Job>(&sql).bind(id);
        let query = match update {
            JobUpdate::Start { progress } | JobUpdate::Progress(progress) => query.bind(progress),
            JobUpdate::Complete(result) => query.bind(serde_json::to_value(&result)?),
            JobUpdate::Fail(error) => query.bind(error),
        };

        match query.fetch_optional(&self.pool).await? {
            Some(job) => {
                tracing::debug!(job_id = %id, status = %job.status, progress = job.progress, "Job updated");
                Ok(job)
            }
            None => Err(self.refusal(id, attempted).await),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn fail_stale_running(
        &self,
        older_than: DateTime<Utc>,
        error: &str,
    ) -> Result<Vec<Uuid>, AppError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE jobs
            SET status = 'failed', error = $2, updated_at = NOW()
            WHERE status = 'running' AND job_type = 'hd_render' AND updated_at < $1
            RETURNING id
            "#,
        )
        .bind(older_than)
        .bind(error)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
