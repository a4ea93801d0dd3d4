use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub store: ComponentHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
    pub queue_depth: Option<u64>,
}

/// GET /health — health check with job store status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();

    let store_check = match state.store.health_check().await {
        Ok(_) => {
            let latency_ms = Some(start.elapsed().as_millis() as u64);
            let queue_depth = state.store.queue_depth().await.ok();
            if let Some(depth) = queue_depth {
                metrics::gauge!("extraction_queue_depth").set(depth as f64);
            }
            ComponentHealth {
                status: "ok".to_string(),
                latency_ms,
                queue_depth,
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Job store health check failed");
            ComponentHealth {
                status: "error".to_string(),
                latency_ms: None,
                queue_depth: None,
            }
        }
    };

    let healthy = store_check.status == "ok";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks { store: store_check },
    };

    (status_code, Json(response))
}
