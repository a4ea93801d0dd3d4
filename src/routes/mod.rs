pub mod auth;
pub mod extract;
pub mod health;
pub mod metrics;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Build the HTTP surface. `/metrics` is mounted only when a Prometheus
/// handle is supplied.
pub fn build_router(
    state: AppState,
    max_upload_bytes: usize,
    prometheus: Option<Arc<PrometheusHandle>>,
) -> Router {
    let api = Router::new()
        .route("/api/v1/extract", post(extract::submit_extraction))
        .route("/api/v1/result/{job_id}", get(extract::get_result))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    let mut app = Router::new()
        .route("/health", get(health::health_check))
        .merge(api)
        .with_state(state);

    if let Some(handle) = prometheus {
        app = app.route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(handle),
        );
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
}
