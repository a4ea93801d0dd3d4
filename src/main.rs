use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;

use cheque_extract::{
    app_state::{self, AppState},
    config::AppConfig,
    routes,
    services::{reaper, worker},
    telemetry,
};

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing cheque-extract server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    telemetry::describe_metrics();

    // Initialize job store
    if config.redis_url.is_some() {
        tracing::info!("Connecting to Redis job store");
    } else {
        tracing::warn!("REDIS_URL not set, using the in-memory job store");
    }
    let store = app_state::open_store(&config).expect("Failed to initialize job store");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // The in-memory store is invisible to other processes, so it needs workers here.
    let embedded_workers = match (&config.redis_url, config.embedded_workers) {
        (None, 0) => 1,
        (_, n) => n,
    };
    let mut background = Vec::new();
    if embedded_workers > 0 {
        tracing::info!(workers = embedded_workers, "Loading model adapters for embedded workers");
        let pipeline =
            Arc::new(app_state::build_pipeline(&config).expect("Failed to initialize model adapters"));
        background.extend(worker::spawn_pool(
            embedded_workers,
            Arc::clone(&store),
            pipeline,
            shutdown_rx.clone(),
        ));
        background.push(tokio::spawn(reaper::run(
            Arc::clone(&store),
            config.reaper(),
            shutdown_rx.clone(),
        )));
    }

    let state = AppState::new(store, config.api_key.clone());
    if state.api_key.is_none() {
        tracing::warn!("API_KEY not set, API routes are unauthenticated");
    }

    let app = routes::build_router(state, config.max_upload_bytes, Some(prometheus_handle));

    tracing::info!("Starting cheque-extract on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");

    let _ = shutdown_tx.send(true);
    for handle in background {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Background task ended abnormally");
        }
    }
    tracing::info!("Server stopped");
}
