// ============================================================================
// Health and Metrics Routes
// ============================================================================
//
// Endpoints:
// - GET /health       - JSON status, 200 when ready and live, else 503
// - GET /health/live  - 200 when live, else 503
// - GET /health/ready - 200 when ready, else 503
// - GET /metrics      - Prometheus metrics
//
// ============================================================================

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::health::HealthReporter;

fn status_code(ok: bool) -> StatusCode {
    if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
pub async fn health_check(State(health): State<HealthReporter>) -> impl IntoResponse {
    let snapshot = health.snapshot();
    let code = status_code(snapshot.ready && snapshot.live);
    if code != StatusCode::OK {
        tracing::debug!(
            ready = snapshot.ready,
            live = snapshot.live,
            broker = snapshot.broker,
            "Health check reporting unavailable"
        );
    }
    (code, Json(snapshot))
}

/// GET /health/live
pub async fn liveness(State(health): State<HealthReporter>) -> impl IntoResponse {
    let live = health.is_live();
    (status_code(live), if live { "OK" } else { "Not Live" })
}

/// GET /health/ready
pub async fn readiness(State(health): State<HealthReporter>) -> impl IntoResponse {
    let ready = health.is_ready();
    (status_code(ready), if ready { "OK" } else { "Not Ready" })
}

/// GET /metrics
/// Prometheus metrics endpoint
pub async fn metrics() -> impl IntoResponse {
    match submission_metrics::gather_metrics() {
        Ok(metrics_data) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            metrics_data,
        ),
        Err(e) => {
            tracing::error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain")],
                "Internal Server Error".to_string(),
            )
        }
    }
}
