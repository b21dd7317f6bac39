//! Prometheus exposition of the collector's own counters.

use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

const CONTENT_TYPE_PROMETHEUS: &str = "text/plain; version=0.0.4";

/// Creates the metrics route.
pub fn metrics_routes(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(render))
        .with_state(state)
}

async fn render(State(state): State<AppState>) -> Response {
    match state.prometheus() {
        Some(handle) => (
            [(header::CONTENT_TYPE, CONTENT_TYPE_PROMETHEUS)],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Prometheus recorder not installed").into_response(),
    }
}
