use async_trait::async_trait;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;
use weave_core::models::{NewUpload, Upload};
use weave_core::AppError;

use crate::db::traits::UploadRepository;

const UPLOAD_COLUMNS: &str =
    "id, project_id, upload_type, url, storage_key, width, height, metadata, created_at";

#[derive(Clone)]
pub struct PostgresUploadRepository {
    pool: PgPool,
}

impl PostgresUploadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UploadRepository for PostgresUploadRepository {
    #[tracing::instrument(skip(self, upload), fields(upload_type = %upload.upload_type))]
    async fn insert(&self, upload: NewUpload) -> Result<Upload, AppError> {
        let row = insert_row(&self.pool, &upload).await?;
        tracing::debug!(upload_id = %row.id, "Upload recorded");
        Ok(row)
    }

    #[tracing::instrument(skip(self, uploads), fields(count = uploads.len()))]
    async fn insert_all(&self, uploads: Vec<NewUpload>) -> Result<Vec<Upload>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut rows = Vec::with_capacity(uploads.len());
        for upload in &uploads {
            rows.push(insert_row(&mut *tx, upload).await?);
        }
        tx.commit().await?;
        tracing::debug!(count = rows.len(), "Uploads recorded");
        Ok(rows)
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Upload>, AppError> {
        let sql = format!("SELECT {} FROM uploads WHERE id = $1", UPLOAD_COLUMNS);
        let row = sqlx::query_as::<Postgres, Upload>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

async fn insert_row<'e, E>(executor: E, upload: &NewUpload) -> Result<Upload, AppError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        INSERT INTO uploads (project_id, upload_type, url, storage_key, width, height, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        UPLOAD_COLUMNS
    );

    sqlx::query_as::<Postgres, Upload>(&sql)
        .bind(&upload.project_id)
        .bind(upload.upload_type.as_str())
        .bind(&upload.file.url)
        .bind(&upload.file.key)
        .bind(upload.file.width as i32)
        .bind(upload.file.height as i32)
        .bind(&upload.metadata)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, key = %upload.file.key, "Failed to insert upload");
            AppError::Database(e)
        })
}
