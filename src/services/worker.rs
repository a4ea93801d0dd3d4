//! Worker pool: dequeue, run the pipeline, record the outcome once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::error::ErrorKind;
use crate::models::job::{Completion, Delivery, ErrorResult, JobOutcome};
use crate::services::pipeline::Pipeline;
use crate::services::store::{JobStore, StoreError};

const STORE_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct Worker {
    id: usize,
    store: Arc<dyn JobStore>,
    pipeline: Arc<Pipeline>,
}

impl Worker {
    pub fn new(id: usize, store: Arc<dyn JobStore>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            id,
            store,
            pipeline,
        }
    }

    /// Process jobs until `shutdown` flips to `true`. Shutdown only interrupts
    /// the wait for work; a dequeued job always runs to completion.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker = self.id, "Worker ready, starting job processing loop");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let delivery = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                delivery = self.store.dequeue() => delivery,
            };

            let result = match delivery {
                Ok(delivery) => self.process(delivery).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                tracing::error!(worker = self.id, error = %e, "Job store error, will retry");
                sleep(STORE_RETRY_DELAY).await;
            }
        }
        tracing::info!(worker = self.id, "Worker stopped");
    }

    /// Wait for one job and process it.
    pub async fn process_next(&self) -> Result<Completion, StoreError> {
        let delivery = self.store.dequeue().await?;
        self.process(delivery).await
    }

    async fn process(&self, delivery: Delivery) -> Result<Completion, StoreError> {
        let Delivery {
            job_id,
            input,
            options,
        } = delivery;
        tracing::info!(
            worker = self.id,
            job_id = %job_id,
            size = input.len(),
            perform_recognition = options.perform_recognition,
            "Processing extraction job"
        );

        let start = Instant::now();
        let pipeline = Arc::clone(&self.pipeline);
        let task = tokio::spawn(async move { pipeline.run(job_id, input, options).await });
        let outcome = match task.await {
            Ok(Ok(result)) => JobOutcome::Success(result),
            Ok(Err(e)) => {
                tracing::error!(job_id = %job_id, error = %e, "Job processing failed");
                JobOutcome::Failure(e.into())
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Pipeline task aborted");
                JobOutcome::Failure(ErrorResult::new(
                    ErrorKind::Internal,
                    "Internal error while processing the image",
                ))
            }
        };
        let elapsed = start.elapsed();
        metrics::histogram!("extraction_processing_seconds").record(elapsed.as_secs_f64());

        let succeeded = outcome.is_success();
        let completion = self.store.complete(job_id, outcome).await?;
        match completion {
            Completion::Recorded if succeeded => {
                metrics::counter!("extraction_jobs_completed_total").increment(1);
                tracing::info!(
                    job_id = %job_id,
                    duration_ms = elapsed.as_millis() as u64,
                    "Job completed successfully"
                );
            }
            Completion::Recorded => {
                metrics::counter!("extraction_jobs_failed_total").increment(1);
                tracing::warn!(job_id = %job_id, "Job recorded as failed");
            }
            Completion::AlreadyTerminal => {
                tracing::debug!(
                    job_id = %job_id,
                    kind = ?completion.rejection(),
                    "Job already terminal, duplicate delivery ignored"
                );
            }
            Completion::Expired => {
                tracing::warn!(
                    job_id = %job_id,
                    kind = ?completion.rejection(),
                    "Job expired before its result was recorded"
                );
            }
        }
        Ok(completion)
    }
}

/// Spawn `count` workers sharing one store and one pipeline.
pub fn spawn_pool(
    count: usize,
    store: Arc<dyn JobStore>,
    pipeline: Arc<Pipeline>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let worker = Worker::new(id, Arc::clone(&store), Arc::clone(&pipeline));
            tokio::spawn(worker.run(shutdown.clone()))
        })
        .collect()
}
