//! Health check endpoints.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Extension, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use shared::models::TraceContext;
use std::time::Instant;

/// Creates the health check routes.
///
/// # Routes
///
/// - `GET /health` - Basic health check
/// - `GET /health/detailed` - Per-component status
/// - `GET /health/live` - Liveness probe
/// - `GET /health/ready` - Readiness probe
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/detailed", get(health_detailed))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .with_state(state)
}

/// Handler for `GET /health`.
async fn health_check(
    State(state): State<AppState>,
    Extension(ctx): Extension<TraceContext>,
) -> Json<Value> {
    let mut span = state.telemetry().start_span("health_check", Some(&ctx));
    span.set_attribute("health.status", "healthy");

    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Handler for `GET /health/detailed`.
///
/// The task store decides the overall status. Export trouble only marks the
/// collector check `degraded`, since telemetry is off the request path.
async fn health_detailed(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let database = match state.tasks().list() {
        Ok(_) => json!({
            "status": "healthy",
            "latency_ms": started.elapsed().as_secs_f64() * 1000.0,
        }),
        Err(e) => json!({ "status": "unhealthy", "error": e.to_string() }),
    };
    let healthy = database["status"] == "healthy";

    let stats = state.telemetry().stats();
    let failed_batches =
        stats.traces.failed_batches + stats.metrics.failed_batches + stats.logs.failed_batches;
    let collector = if failed_batches == 0 {
        json!({ "status": "healthy" })
    } else {
        json!({ "status": "degraded", "failed_batches": failed_batches })
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "checks": {
                "database": database,
                "otel_collector": collector,
            },
        })),
    )
}

async fn liveness() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}

async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.tasks().list() {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "error": e.to_string() })),
        ),
    }
}
