// ============================================================================
// Axum Routes Module
// ============================================================================
//
// The listener only serves probes and metrics:
// - health.rs: /health, /health/live, /health/ready and /metrics
//
// Anything else is answered with 404.
//
// ============================================================================

mod health;

use axum::{http::StatusCode, routing::get, Router};

use crate::health::HealthReporter;

/// Create the probe router
pub fn create_router(health: HealthReporter) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(health::metrics))
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not Found") })
        .with_state(health)
}
