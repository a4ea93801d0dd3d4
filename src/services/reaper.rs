use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::services::store::{JobStore, StoreError};

/// Configuration for the lease reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Age after which an unacknowledged delivery is handed out again
    pub lease_timeout: Duration,
    /// Pause between passes
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_secs(300), // 5 minutes
            interval: Duration::from_secs(60),
        }
    }
}

/// Report of one reaper pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReaperReport {
    /// Jobs put back on the queue after their worker went silent
    pub requeued: usize,
    /// Expired jobs evicted from the store
    pub swept: usize,
}

impl ReaperReport {
    pub fn is_empty(&self) -> bool {
        self.requeued == 0 && self.swept == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReaperError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("reaper configuration invalid: {0}")]
    InvalidConfig(String),
}

/// Run one redelivery and eviction pass.
pub async fn reap_once(store: &dyn JobStore, config: &ReaperConfig) -> Result<ReaperReport, ReaperError> {
    if config.lease_timeout.is_zero() {
        return Err(ReaperError::InvalidConfig(
            "lease timeout must be positive".to_string(),
        ));
    }

    let requeued = store.requeue_expired_leases(config.lease_timeout).await?;
    let swept = store.sweep().await?;
    Ok(ReaperReport { requeued, swept })
}

/// Reap every `config.interval` until `shutdown` flips to `true`.
pub async fn run(store: Arc<dyn JobStore>, config: ReaperConfig, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                match reap_once(store.as_ref(), &config).await {
                    Ok(report) if report.is_empty() => tracing::trace!("Reaper pass found nothing"),
                    Ok(report) => tracing::info!(requeued = report.requeued, swept = report.swept, "Reaper pass complete"),
                    Err(e) => tracing::error!(error = %e, "Reaper pass failed"),
                }
                if let Ok(depth) = store.queue_depth().await {
                    metrics::gauge!("extraction_queue_depth").set(depth as f64);
                }
            }
        }
    }
}
