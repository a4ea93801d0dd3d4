use tracing_subscriber::EnvFilter;

/// Initialize structured JSON logging, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
}

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "extraction_jobs_submitted_total",
        "Total extraction jobs accepted for processing"
    );
    metrics::describe_counter!(
        "extraction_jobs_completed_total",
        "Total extraction jobs that reached success"
    );
    metrics::describe_counter!(
        "extraction_jobs_failed_total",
        "Total extraction jobs that reached failure"
    );
    metrics::describe_counter!(
        "extraction_recognition_failures_total",
        "Recognition attempts that were absorbed into a null result"
    );
    metrics::describe_histogram!(
        "extraction_processing_seconds",
        "Time to run the pipeline for one job"
    );
    metrics::describe_gauge!(
        "extraction_queue_depth",
        "Current number of jobs waiting in the queue"
    );
}
