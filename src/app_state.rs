use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::inference::{HttpDetector, HttpRecognizer};
use crate::services::pipeline::Pipeline;
use crate::services::store::{JobStore, MemoryJobStore, RedisJobStore, StoreError};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>, api_key: Option<String>) -> Self {
        Self {
            store,
            api_key: api_key.filter(|key| !key.is_empty()).map(Arc::from),
        }
    }
}

/// Open the configured job store: Redis when `REDIS_URL` is set, otherwise
/// a process-local store.
pub fn open_store(config: &AppConfig) -> Result<Arc<dyn JobStore>, StoreError> {
    match &config.redis_url {
        Some(url) => {
            let store = RedisJobStore::new(url, config.job_ttl(), config.dequeue_block())?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryJobStore::new(config.job_ttl()))),
    }
}

/// Build the pipeline with the HTTP model adapters. Called once per process.
pub fn build_pipeline(config: &AppConfig) -> Result<Pipeline, reqwest::Error> {
    let detector = HttpDetector::new(&config.detector_url, config.inference_timeout())?;
    let recognizer = HttpRecognizer::new(&config.recognizer_url, config.inference_timeout())?;
    Ok(Pipeline::new(Arc::new(detector), Arc::new(recognizer))
        .with_binarize_threshold(config.crop_threshold()))
}
