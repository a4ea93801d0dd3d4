use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use super::{JobStore, StoreError};
use crate::models::job::{
    Completion, Delivery, JobId, JobOptions, JobOutcome, JobState, QueuedJob,
};

const QUEUE_KEY: &str = "cheque:jobs";
const PROCESSING_KEY: &str = "cheque:processing";
const LEASES_KEY: &str = "cheque:leases";

fn job_key(job_id: JobId) -> String {
    format!("cheque:job:{job_id}")
}

fn input_key(job_id: JobId) -> String {
    format!("cheque:input:{job_id}")
}

fn result_key(job_id: JobId) -> String {
    format!("cheque:result:{job_id}")
}

/// Delivery bookkeeping kept in the lease hash until the job is acknowledged.
#[derive(Debug, Serialize, Deserialize)]
struct Lease {
    /// Exact queue payload, needed to remove the entry from the processing list.
    payload: String,
    leased_at_ms: i64,
}

impl Lease {
    fn now(payload: String) -> Self {
        Self {
            payload,
            leased_at_ms: Utc::now().timestamp_millis(),
        }
    }
}

/// Redis-backed job store.
///
/// Every per-job key carries a TTL that ends at the job's deadline, so Redis
/// purges metadata, input and result together. Results are written with
/// `SET NX`, which makes the first completion the only one.
pub struct RedisJobStore {
    client: redis::Client,
    ttl: Duration,
    block: Duration,
}

impl RedisJobStore {
    pub fn new(redis_url: &str, ttl: Duration, block: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(StoreError::Redis)?;
        Ok(Self { client, ttl, block })
    }

    async fn conn(&self) -> Result<MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(StoreError::Redis)
    }

    /// Remove a delivery from the processing list and drop its lease.
    async fn acknowledge(
        &self,
        conn: &mut MultiplexedConnection,
        job_id: JobId,
    ) -> Result<(), StoreError> {
        let field = job_id.to_string();
        let lease: Option<String> = conn.hget(LEASES_KEY, &field).await?;
        if let Some(lease) = lease {
            let lease: Lease = serde_json::from_str(&lease)?;
            conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &lease.payload).await?;
        }
        conn.hdel::<_, _, ()>(LEASES_KEY, &field).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn enqueue(&self, input: Vec<u8>, options: JobOptions) -> Result<JobId, StoreError> {
        let job = QueuedJob::new(options, self.ttl);
        let payload = serde_json::to_string(&job)?;
        let ttl_ms = self.ttl.as_millis().max(1) as u64;

        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(job_key(job.job_id))
            .arg(&payload)
            .arg("PX")
            .arg(ttl_ms)
            .ignore()
            .cmd("SET")
            .arg(input_key(job.job_id))
            .arg(input.as_slice())
            .arg("PX")
            .arg(ttl_ms)
            .ignore()
            .lpush(QUEUE_KEY, &payload)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(job.job_id)
    }

    async fn dequeue(&self) -> Result<Delivery, StoreError> {
        let block_secs = self.block.as_secs().max(1);
        loop {
            // Blocking commands stall a multiplexed connection, so each wait
            // gets its own.
            let mut conn = self.conn().await?;
            let payload: Option<String> = redis::cmd("BRPOPLPUSH")
                .arg(QUEUE_KEY)
                .arg(PROCESSING_KEY)
                .arg(block_secs)
                .query_async(&mut conn)
                .await?;
            let Some(payload) = payload else {
                continue;
            };

            let job: QueuedJob = match serde_json::from_str(&payload) {
                Ok(job) => job,
                Err(err) => {
                    tracing::error!(error = %err, "dropping malformed queue entry");
                    conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
                    continue;
                }
            };

            let lease = serde_json::to_string(&Lease::now(payload))?;
            conn.hset::<_, _, _, ()>(LEASES_KEY, job.job_id.to_string(), lease)
                .await?;

            // A lease requeued just before its worker completed can come back
            // around with a result already stored.
            let finished: bool = conn.exists(result_key(job.job_id)).await?;
            if finished {
                tracing::debug!(job_id = %job.job_id, "job already terminal, dropping redelivery");
                self.acknowledge(&mut conn, job.job_id).await?;
                continue;
            }

            let input: Option<Vec<u8>> = conn.get(input_key(job.job_id)).await?;
            match input {
                Some(input) => {
                    return Ok(Delivery {
                        job_id: job.job_id,
                        input,
                        options: job.options,
                    })
                }
                None => {
                    tracing::warn!(job_id = %job.job_id, "input expired before delivery, skipping");
                    self.acknowledge(&mut conn, job.job_id).await?;
                }
            }
        }
    }

    async fn complete(&self, job_id: JobId, outcome: JobOutcome) -> Result<Completion, StoreError> {
        let mut conn = self.conn().await?;

        let meta: Option<String> = conn.get(job_key(job_id)).await?;
        let remaining = match meta {
            Some(meta) => serde_json::from_str::<QueuedJob>(&meta)?.remaining(Utc::now()),
            None => None,
        };
        let Some(remaining) = remaining else {
            self.acknowledge(&mut conn, job_id).await?;
            return Ok(Completion::Expired);
        };

        let body = serde_json::to_string(&outcome)?;
        let written: Option<String> = redis::cmd("SET")
            .arg(result_key(job_id))
            .arg(body)
            .arg("NX")
            .arg("PX")
            .arg(remaining.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;

        self.acknowledge(&mut conn, job_id).await?;
        if written.is_none() {
            return Ok(Completion::AlreadyTerminal);
        }
        conn.del::<_, ()>(input_key(job_id)).await?;
        Ok(Completion::Recorded)
    }

    async fn get_state(&self, job_id: JobId) -> Result<JobState, StoreError> {
        let mut conn = self.conn().await?;

        let result: Option<String> = conn.get(result_key(job_id)).await?;
        if let Some(result) = result {
            let outcome: JobOutcome = serde_json::from_str(&result)?;
            return Ok(outcome.into());
        }

        let exists: bool = conn.exists(job_key(job_id)).await?;
        Ok(if exists {
            JobState::Pending
        } else {
            JobState::Unknown
        })
    }

    async fn requeue_expired_leases(&self, lease_timeout: Duration) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;
        let now_ms = Utc::now().timestamp_millis();
        let cutoff_ms = now_ms - lease_timeout.as_millis() as i64;

        let mut leases: HashMap<String, String> = conn.hgetall(LEASES_KEY).await?;

        // A worker that died between the move and the lease write leaves an
        // entry with no lease. Start its clock now so the next pass reaps it.
        let processing: Vec<String> = conn.lrange(PROCESSING_KEY, 0, -1).await?;
        for payload in processing {
            let Ok(job) = serde_json::from_str::<QueuedJob>(&payload) else {
                continue;
            };
            let field = job.job_id.to_string();
            if !leases.contains_key(&field) {
                let lease = serde_json::to_string(&Lease::now(payload))?;
                conn.hset::<_, _, _, ()>(LEASES_KEY, &field, &lease).await?;
                leases.insert(field, lease);
            }
        }

        let mut requeued = 0;
        for (field, lease) in leases {
            let lease: Lease = serde_json::from_str(&lease)?;
            if lease.leased_at_ms > cutoff_ms {
                continue;
            }
            let Ok(job_id) = field.parse::<JobId>() else {
                conn.hdel::<_, _, ()>(LEASES_KEY, &field).await?;
                continue;
            };

            let finished: bool = conn.exists(result_key(job_id)).await?;
            let alive: bool = conn.exists(job_key(job_id)).await?;
            if finished || !alive {
                self.acknowledge(&mut conn, job_id).await?;
                continue;
            }

            redis::pipe()
                .atomic()
                .lrem(PROCESSING_KEY, 1, &lease.payload)
                .ignore()
                .rpush(QUEUE_KEY, &lease.payload)
                .ignore()
                .hdel(LEASES_KEY, &field)
                .ignore()
                .query_async::<()>(&mut conn)
                .await?;
            tracing::warn!(job_id = %job_id, "lease expired, job redelivered");
            requeued += 1;
        }

        Ok(requeued)
    }

    async fn sweep(&self) -> Result<usize, StoreError> {
        // Key TTLs do the purging.
        Ok(0)
    }

    async fn queue_depth(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_per_job() {
        let id = JobId::new();
        assert_eq!(job_key(id), format!("cheque:job:{id}"));
        assert_eq!(input_key(id), format!("cheque:input:{id}"));
        assert_eq!(result_key(id), format!("cheque:result:{id}"));
    }

    #[test]
    fn lease_keeps_the_exact_queue_payload() {
        let job = QueuedJob::new(JobOptions::default(), Duration::from_secs(60));
        let payload = serde_json::to_string(&job).unwrap();
        let lease: Lease =
            serde_json::from_str(&serde_json::to_string(&Lease::now(payload.clone())).unwrap())
                .unwrap();
        assert_eq!(lease.payload, payload);
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(RedisJobStore::new("not a url", Duration::from_secs(1), Duration::from_secs(1)).is_err());
    }
}
