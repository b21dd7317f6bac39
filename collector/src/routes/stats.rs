//! Pipeline counters.

use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use shared::pipeline::PipelineStats;

/// Creates the stats route.
pub fn stats_routes(state: AppState) -> Router {
    Router::new()
        .route("/stats", get(stats))
        .with_state(state)
}

/// Memory guard and per-signal export counters as JSON.
async fn stats(State(state): State<AppState>) -> Json<PipelineStats> {
    Json(state.pipeline().stats())
}
