//! Health check endpoints.
//!
//! Provides liveness and readiness probes for load balancers, container
//! orchestrators and the browser emitter.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status (always "healthy" if reachable).
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Readiness response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "throttled".
    pub status: &'static str,
    /// Bytes currently leased by in-flight data.
    pub memory_in_use_bytes: u64,
    /// Usage above which admission is throttled.
    pub memory_soft_limit_bytes: u64,
}

/// Creates the health check routes.
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .with_state(state)
}

/// Health check handler.
///
/// Returns a simple JSON response indicating the service is healthy.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pillars-collector",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Readiness handler.
///
/// Reports 503 while the memory guard is above its soft limit, so a balancer
/// can steer new data elsewhere until buffers drain.
async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let guard = state.pipeline().guard();
    let throttled = guard.is_above_soft_limit();

    let status = if throttled {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(ReadinessResponse {
            status: if throttled { "throttled" } else { "ready" },
            memory_in_use_bytes: guard.in_use(),
            memory_soft_limit_bytes: guard.limits().soft_limit(),
        }),
    )
}
