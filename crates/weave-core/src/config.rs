//! Configuration module
//!
//! Everything is read from the environment (after loading `.env` when present)
//! and checked once at startup by [`Config::validate`].

use std::env;
use std::str::FromStr;

use crate::constants::DEFAULT_STORAGE_FOLDER;
use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 3000;
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_UPLOAD_SIZE_BYTES: usize = 20 * 1024 * 1024;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Settings shared by anything that serves HTTP
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub max_upload_size_bytes: usize,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            cors_origins: vec!["*".to_string()],
            environment: "development".to_string(),
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            max_upload_size_bytes: MAX_UPLOAD_SIZE_BYTES,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WeaveConfig {
    pub base: BaseConfig,
    /// `None` selects the in-memory document store (development only).
    pub database_url: Option<String>,
    // Storage
    pub storage_backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub storage_folder: String,
    // Task queue
    pub task_queue_max_workers: usize,
    pub task_queue_poll_interval_ms: u64,
    pub task_queue_max_retries: i32,
    pub task_queue_timeout_seconds: i32,
    /// 0 disables the stale job reaper.
    pub job_stale_after_seconds: u64,
    // Segmentation
    pub sam_checkpoint: String,
    pub segmentation_input_size: u32,
    // Inpainting
    pub sd_model_id: String,
    pub sd_use_cpu: bool,
    pub sd_guidance_scale: f64,
    pub sd_steps: usize,
    pub sd_strength: f64,
    pub sd_seed: Option<u64>,
    // Preview
    pub preview_blend_iterations: usize,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            base: BaseConfig::default(),
            database_url: None,
            storage_backend: StorageBackend::Local,
            local_storage_path: None,
            local_storage_base_url: None,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            storage_folder: DEFAULT_STORAGE_FOLDER.to_string(),
            task_queue_max_workers: 1,
            task_queue_poll_interval_ms: 1000,
            task_queue_max_retries: 3,
            task_queue_timeout_seconds: 1800,
            job_stale_after_seconds: 3600,
            sam_checkpoint: "/weights/sam_auto.onnx".to_string(),
            segmentation_input_size: 1024,
            sd_model_id: "runwayml/stable-diffusion-inpainting".to_string(),
            sd_use_cpu: false,
            sd_guidance_scale: 7.5,
            sd_steps: 30,
            sd_strength: 0.8,
            sd_seed: None,
            preview_blend_iterations: 400,
        }
    }
}

impl WeaveConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let defaults = WeaveConfig::default();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| defaults.base.environment.clone());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        if is_production_name(&environment) && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        let cors_origins = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let storage_backend = match env_opt("STORAGE_BACKEND") {
            Some(raw) => raw.parse::<StorageBackend>()?,
            None => defaults.storage_backend,
        };

        let sd_seed = match env_opt("SD_SEED") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| anyhow::anyhow!("SD_SEED must be an unsigned integer: {}", e))?,
            ),
            None => None,
        };

        let base = BaseConfig {
            server_port: env_or("SERVER_PORT", env_or("PORT", defaults.base.server_port)),
            cors_origins,
            environment,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", defaults.base.db_max_connections),
            db_timeout_seconds: env_or("DB_TIMEOUT_SECONDS", defaults.base.db_timeout_seconds),
            max_upload_size_bytes: env_or(
                "MAX_UPLOAD_SIZE_BYTES",
                defaults.base.max_upload_size_bytes,
            ),
        };

        Ok(WeaveConfig {
            base,
            database_url: env_opt("DATABASE_URL"),
            storage_backend,
            local_storage_path: env_opt("LOCAL_STORAGE_PATH"),
            local_storage_base_url: env_opt("LOCAL_STORAGE_BASE_URL"),
            s3_bucket: env_opt("S3_BUCKET"),
            s3_region: env_opt("S3_REGION").or_else(|| env_opt("AWS_REGION")),
            s3_endpoint: env_opt("S3_ENDPOINT"),
            storage_folder: env_opt("STORAGE_FOLDER")
                .map(|f| f.trim_matches('/').to_string())
                .unwrap_or(defaults.storage_folder),
            task_queue_max_workers: env_or(
                "TASK_QUEUE_MAX_WORKERS",
                defaults.task_queue_max_workers,
            ),
            task_queue_poll_interval_ms: env_or(
                "TASK_QUEUE_POLL_INTERVAL_MS",
                defaults.task_queue_poll_interval_ms,
            ),
            task_queue_max_retries: env_or(
                "TASK_QUEUE_MAX_RETRIES",
                defaults.task_queue_max_retries,
            ),
            task_queue_timeout_seconds: env_or(
                "TASK_QUEUE_TIMEOUT_SECONDS",
                defaults.task_queue_timeout_seconds,
            ),
            job_stale_after_seconds: env_or(
                "JOB_STALE_AFTER_SECONDS",
                defaults.job_stale_after_seconds,
            ),
            sam_checkpoint: env_opt("SAM_CHECKPOINT").unwrap_or(defaults.sam_checkpoint),
            segmentation_input_size: env_or(
                "SEGMENTATION_INPUT_SIZE",
                defaults.segmentation_input_size,
            ),
            sd_model_id: env_opt("SD_MODEL_ID").unwrap_or(defaults.sd_model_id),
            sd_use_cpu: env_or("SD_USE_CPU", defaults.sd_use_cpu),
            sd_guidance_scale: env_or("SD_GUIDANCE_SCALE", defaults.sd_guidance_scale),
            sd_steps: env_or("SD_STEPS", defaults.sd_steps),
            sd_strength: env_or("SD_STRENGTH", defaults.sd_strength),
            sd_seed,
            preview_blend_iterations: env_or(
                "PREVIEW_BLEND_ITERATIONS",
                defaults.preview_blend_iterations,
            ),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match &self.database_url {
            Some(url) if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) => {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
            None if is_production_name(&self.base.environment) => {
                return Err(anyhow::anyhow!("DATABASE_URL must be set in production"));
            }
            _ => {}
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        if self.task_queue_max_workers == 0 {
            return Err(anyhow::anyhow!("TASK_QUEUE_MAX_WORKERS must be at least 1"));
        }
        if self.task_queue_max_retries < 0 {
            return Err(anyhow::anyhow!("TASK_QUEUE_MAX_RETRIES cannot be negative"));
        }
        // The reaper must never fail a job the dispatcher still considers in flight.
        if self.job_stale_after_seconds > 0
            && self.task_queue_timeout_seconds > 0
            && self.job_stale_after_seconds <= self.task_queue_timeout_seconds as u64
        {
            return Err(anyhow::anyhow!(
                "JOB_STALE_AFTER_SECONDS ({}) must exceed TASK_QUEUE_TIMEOUT_SECONDS ({})",
                self.job_stale_after_seconds,
                self.task_queue_timeout_seconds
            ));
        }
        if self.sd_steps == 0 {
            return Err(anyhow::anyhow!("SD_STEPS must be at least 1"));
        }
        if !(self.sd_strength > 0.0 && self.sd_strength <= 1.0) {
            return Err(anyhow::anyhow!("SD_STRENGTH must be in (0, 1]"));
        }
        if !self.sd_guidance_scale.is_finite() || self.sd_guidance_scale < 0.0 {
            return Err(anyhow::anyhow!("SD_GUIDANCE_SCALE must be a non-negative number"));
        }
        if self.segmentation_input_size == 0 {
            return Err(anyhow::anyhow!("SEGMENTATION_INPUT_SIZE must be positive"));
        }

        Ok(())
    }
}

fn is_production_name(environment: &str) -> bool {
    let env = environment.to_lowercase();
    env == "production" || env == "prod"
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<WeaveConfig>);

impl Config {
    fn as_weave(&self) -> &WeaveConfig {
        &self.0
    }

    pub fn is_production(&self) -> bool {
        is_production_name(&self.as_weave().base.environment)
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = WeaveConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_weave().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.as_weave().base.server_port
    }

    pub fn environment(&self) -> &str {
        &self.as_weave().base.environment
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.as_weave().base.cors_origins
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_weave().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_weave().base.db_timeout_seconds
    }

    pub fn max_upload_size_bytes(&self) -> usize {
        self.as_weave().base.max_upload_size_bytes
    }

    pub fn database_url(&self) -> Option<&str> {
        self.as_weave().database_url.as_deref()
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.as_weave().storage_backend
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_weave().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.as_weave().local_storage_base_url.as_deref()
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.as_weave().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.as_weave().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_weave().s3_endpoint.as_deref()
    }

    pub fn storage_folder(&self) -> &str {
        &self.as_weave().storage_folder
    }

    pub fn task_queue_max_workers(&self) -> usize {
        self.as_weave().task_queue_max_workers
    }

    pub fn task_queue_poll_interval_ms(&self) -> u64 {
        self.as_weave().task_queue_poll_interval_ms
    }

    pub fn task_queue_max_retries(&self) -> i32 {
        self.as_weave().task_queue_max_retries
    }

    pub fn task_queue_timeout_seconds(&self) -> i32 {
        self.as_weave().task_queue_timeout_seconds
    }

    pub fn job_stale_after_seconds(&self) -> u64 {
        self.as_weave().job_stale_after_seconds
    }

    pub fn sam_checkpoint(&self) -> &str {
        &self.as_weave().sam_checkpoint
    }

    pub fn segmentation_input_size(&self) -> u32 {
        self.as_weave().segmentation_input_size
    }

    pub fn sd_model_id(&self) -> &str {
        &self.as_weave().sd_model_id
    }

    pub fn sd_use_cpu(&self) -> bool {
        self.as_weave().sd_use_cpu
    }

    pub fn sd_guidance_scale(&self) -> f64 {
        self.as_weave().sd_guidance_scale
    }

    pub fn sd_steps(&self) -> usize {
        self.as_weave().sd_steps
    }

    pub fn sd_strength(&self) -> f64 {
        self.as_weave().sd_strength
    }

    pub fn sd_seed(&self) -> Option<u64> {
        self.as_weave().sd_seed
    }

    pub fn preview_blend_iterations(&self) -> usize {
        self.as_weave().preview_blend_iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> WeaveConfig {
        WeaveConfig {
            local_storage_path: Some("/tmp/weave".to_string()),
            local_storage_base_url: Some("http://localhost:3000/media".to_string()),
            ..WeaveConfig::default()
        }
    }

    #[test]
    fn test_defaults_validate_with_local_storage() {
        assert!(local_config().validate().is_ok());
    }

    #[test]
    fn test_local_storage_requires_path() {
        let config = WeaveConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("LOCAL_STORAGE_PATH"));
    }

    #[test]
    fn test_s3_requires_bucket_and_region() {
        let mut config = WeaveConfig {
            storage_backend: StorageBackend::S3,
            ..WeaveConfig::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("S3_BUCKET"));
        config.s3_bucket = Some("weave".to_string());
        assert!(config.validate().unwrap_err().to_string().contains("S3_REGION"));
        config.s3_region = Some("eu-west-1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_requires_database_url() {
        let mut config = local_config();
        config.base.environment = "production".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("DATABASE_URL"));
        config.database_url = Some("mysql://nope".to_string());
        assert!(config.validate().is_err());
        config.database_url = Some("postgres://weave@localhost/weave".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sd_strength_bounds() {
        let mut config = local_config();
        config.sd_strength = 0.0;
        assert!(config.validate().is_err());
        config.sd_strength = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stale_window_must_exceed_task_timeout() {
        let mut config = local_config();
        config.task_queue_timeout_seconds = 1800;
        config.job_stale_after_seconds = 600;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("JOB_STALE_AFTER_SECONDS"));
        config.job_stale_after_seconds = 1800;
        assert!(config.validate().is_err());
        config.job_stale_after_seconds = 1801;
        assert!(config.validate().is_ok());
        // Disabled reaper needs no window.
        config.job_stale_after_seconds = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_worker_concurrency_is_one() {
        let config = Config(Box::new(local_config()));
        assert_eq!(config.task_queue_max_workers(), 1);
        assert_eq!(config.task_queue_max_retries(), 3);
        assert!(!config.is_production());
    }
}
