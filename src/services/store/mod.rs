//! Job store and broker: the work queue plus the keyed result table.
//!
//! The store is the single source of truth for job state. `complete` is
//! first-writer-wins per job id, so a redelivered job can never overwrite an
//! outcome that is already recorded.

use std::time::Duration;

use async_trait::async_trait;

use crate::models::job::{Completion, Delivery, JobId, JobOptions, JobOutcome, JobState};

mod memory;
mod redis_store;

pub use self::memory::MemoryJobStore;
pub use self::redis_store::RedisJobStore;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store the input, create a `Pending` job and publish it to the queue.
    async fn enqueue(&self, input: Vec<u8>, options: JobOptions) -> Result<JobId, StoreError>;

    /// Wait for the next job. Each job goes to exactly one caller until its
    /// lease expires unacknowledged. Dropping the future cancels the wait.
    async fn dequeue(&self) -> Result<Delivery, StoreError>;

    /// Record the terminal outcome and acknowledge the delivery.
    async fn complete(&self, job_id: JobId, outcome: JobOutcome) -> Result<Completion, StoreError>;

    async fn get_state(&self, job_id: JobId) -> Result<JobState, StoreError>;

    /// Put deliveries that were never acknowledged within `lease_timeout` back
    /// on the queue. Returns how many jobs were redelivered.
    async fn requeue_expired_leases(&self, lease_timeout: Duration) -> Result<usize, StoreError>;

    /// Evict expired jobs. Returns how many entries were removed.
    async fn sweep(&self) -> Result<usize, StoreError>;

    async fn queue_depth(&self) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
