//! Fault-injection endpoints for exercising dashboards and alerts.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::models::{Attributes, Severity, TraceContext};
use std::time::Duration;

/// Delay used when `/api/simulate-slow` is called without `delay`.
pub const DEFAULT_SLOW_DELAY_SECS: f64 = 2.0;

/// Query parameters of `/api/simulate-slow`.
#[derive(Debug, Deserialize)]
pub struct SlowParams {
    /// Seconds to sleep.
    pub delay: Option<f64>,
}

/// Creates the fault-injection routes.
///
/// # Routes
///
/// - `GET /api/simulate-error` - Always fails with 500
/// - `GET /api/simulate-slow?delay=<seconds>` - Sleeps before answering
pub fn simulate_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/simulate-error", get(simulate_error))
        .route("/api/simulate-slow", get(simulate_slow))
        .with_state(state)
}

async fn simulate_error(
    State(state): State<AppState>,
    Extension(ctx): Extension<TraceContext>,
) -> ApiError {
    let mut span = state.telemetry().start_span("simulate_error", Some(&ctx));
    span.set_attribute("error.simulated", true);
    span.log(
        Severity::Error,
        "Simulated error triggered for testing",
        Attributes::new(),
    );
    span.record_error("Simulated error");

    ApiError::Simulated
}

/// Sleeps for `delay` seconds, capped at the configured maximum.
async fn simulate_slow(
    State(state): State<AppState>,
    Extension(ctx): Extension<TraceContext>,
    Query(params): Query<SlowParams>,
) -> Result<Json<Value>, ApiError> {
    let requested = params.delay.unwrap_or(DEFAULT_SLOW_DELAY_SECS);
    if !requested.is_finite() || requested < 0.0 {
        return Err(ApiError::Validation(
            "delay must be a non-negative number of seconds".to_string(),
        ));
    }
    let delay = requested.min(state.max_slow_delay().as_secs_f64());

    let mut span = state
        .telemetry()
        .start_span("simulate_slow_request", Some(&ctx));
    span.set_attribute("delay.seconds", delay);
    if delay < requested {
        span.set_attribute("delay.capped", true);
    }
    span.log(
        Severity::Info,
        format!("Simulating slow request with {delay}s delay"),
        Attributes::new(),
    );

    tokio::time::sleep(Duration::from_secs_f64(delay)).await;

    Ok(Json(json!({
        "message": format!("Delayed response after {delay} seconds")
    })))
}
