use std::net::SocketAddr;
use std::sync::Arc;

use cheque_extract::{
    app_state,
    config::AppConfig,
    services::{reaper, worker},
    telemetry,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    tracing::info!("Starting extraction worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    if config.redis_url.is_none() {
        panic!("REDIS_URL must be set for a standalone worker; without it run embedded workers in the server");
    }

    if let Some(addr) = &config.worker_metrics_addr {
        let addr: SocketAddr = addr.parse().expect("Invalid WORKER_METRICS_ADDR");
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .expect("Failed to install Prometheus exporter");
        telemetry::describe_metrics();
        tracing::info!(%addr, "Serving worker metrics");
    }

    tracing::info!("Connecting to Redis job store");
    let store = app_state::open_store(&config).expect("Failed to initialize job store");
    store
        .health_check()
        .await
        .expect("Job store is not reachable");

    // Adapters are loaded once and shared by every worker task.
    tracing::info!(
        detector = %config.detector_url,
        recognizer = %config.recognizer_url,
        "Initializing model adapters"
    );
    let pipeline =
        Arc::new(app_state::build_pipeline(&config).expect("Failed to initialize model adapters"));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = worker::spawn_pool(
        config.worker_concurrency.max(1),
        Arc::clone(&store),
        pipeline,
        shutdown_rx.clone(),
    );
    handles.push(tokio::spawn(reaper::run(store, config.reaper(), shutdown_rx)));

    tracing::info!(workers = config.worker_concurrency.max(1), "Worker pool running");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
    }
    tracing::info!("Shutdown signal received, finishing in-flight jobs");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker task ended abnormally");
        }
    }
    tracing::info!("Worker stopped");
}
