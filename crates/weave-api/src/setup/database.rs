//! Document store setup

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use weave_core::Config;
use weave_db::{
    JobRepository, MemoryJobRepository, MemoryTaskRepository, MemoryUploadRepository,
    PostgresJobRepository, PostgresTaskRepository, PostgresUploadRepository, TaskRepository,
    UploadRepository,
};

/// The three stores the service runs on.
#[derive(Clone)]
pub struct Repositories {
    pub uploads: Arc<dyn UploadRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub tasks: Arc<dyn TaskRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            uploads: Arc::new(PostgresUploadRepository::new(pool.clone())),
            jobs: Arc::new(PostgresJobRepository::new(pool.clone())),
            tasks: Arc::new(PostgresTaskRepository::new(pool)),
        }
    }

    /// Process-local stores; contents are lost on restart.
    pub fn in_memory() -> Self {
        Self {
            uploads: Arc::new(MemoryUploadRepository::new()),
            jobs: Arc::new(MemoryJobRepository::new()),
            tasks: Arc::new(MemoryTaskRepository::new()),
        }
    }
}

/// Connect to PostgreSQL and run migrations, or fall back to the in-memory
/// stores when no database is configured.
pub async fn setup_database(config: &Config) -> Result<Repositories> {
    let Some(database_url) = config.database_url() else {
        tracing::warn!("DATABASE_URL not set, using in-memory document store");
        return Ok(Repositories::in_memory());
    };

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds()))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections(),
        "Database connected successfully"
    );

    // Workspace migrations/ relative to this crate
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(Repositories::postgres(pool))
}
