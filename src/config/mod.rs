use std::time::Duration;

use serde::Deserialize;

use crate::services::reaper::ReaperConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000"). Ignored by worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Redis connection string. Unset runs on the in-memory store, which only
    /// works with embedded workers.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Seconds a job and its result live before being purged
    #[serde(default = "default_job_ttl_secs")]
    pub job_ttl_secs: u64,

    /// Base URL of the detection model server
    #[serde(default = "default_detector_url")]
    pub detector_url: String,

    /// Base URL of the recognition model server
    #[serde(default = "default_recognizer_url")]
    pub recognizer_url: String,

    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,

    /// Binarise the image before cropping regions
    #[serde(default = "default_binarize")]
    pub binarize: bool,

    #[serde(default = "default_binarize_threshold")]
    pub binarize_threshold: u8,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Shared API key expected in `X-API-KEY`. Unset disables the check.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Worker tasks in a worker process
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Worker tasks inside the API server process
    #[serde(default)]
    pub embedded_workers: usize,

    #[serde(default = "default_dequeue_block_secs")]
    pub dequeue_block_secs: u64,

    #[serde(default = "default_lease_timeout_secs")]
    pub lease_timeout_secs: u64,

    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,

    /// Prometheus listener for worker processes (e.g., "0.0.0.0:9100")
    #[serde(default)]
    pub worker_metrics_addr: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_job_ttl_secs() -> u64 {
    3600
}

fn default_detector_url() -> String {
    "http://127.0.0.1:9000".to_string()
}

fn default_recognizer_url() -> String {
    "http://127.0.0.1:9001".to_string()
}

fn default_inference_timeout_secs() -> u64 {
    30
}

fn default_binarize() -> bool {
    true
}

fn default_binarize_threshold() -> u8 {
    crate::services::pipeline::DEFAULT_BINARIZE_THRESHOLD
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024 // 10 MB
}

fn default_worker_concurrency() -> usize {
    1
}

fn default_dequeue_block_secs() -> u64 {
    5
}

fn default_lease_timeout_secs() -> u64 {
    300
}

fn default_reaper_interval_secs() -> u64 {
    60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject durations that would make every job expire on arrival or
    /// spin the reaper.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("JOB_TTL_SECS", self.job_ttl_secs),
            ("LEASE_TIMEOUT_SECS", self.lease_timeout_secs),
            ("REAPER_INTERVAL_SECS", self.reaper_interval_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn dequeue_block(&self) -> Duration {
        Duration::from_secs(self.dequeue_block_secs)
    }

    /// Crop binarisation threshold, `None` when disabled.
    pub fn crop_threshold(&self) -> Option<u8> {
        self.binarize.then_some(self.binarize_threshold)
    }

    pub fn reaper(&self) -> ReaperConfig {
        ReaperConfig {
            lease_timeout: Duration::from_secs(self.lease_timeout_secs),
            interval: Duration::from_secs(self.reaper_interval_secs),
        }
    }
}
