//! HTTP route definitions.

mod health;
mod simulate;
mod tasks;

pub use health::health_routes;
pub use simulate::{simulate_routes, SlowParams, DEFAULT_SLOW_DELAY_SECS};
pub use tasks::{task_routes, TaskList};

use shared::emitter::{Telemetry, DATABASE_QUERY_DURATION_SECONDS};
use shared::models::{Labels, MetricKind};
use std::time::Instant;

/// Times one task store call and records it in
/// `database_query_duration_seconds`.
///
/// Returns the call's result and its duration in seconds.
fn timed_query<T>(
    telemetry: &Telemetry,
    operation: &str,
    query: impl FnOnce() -> T,
) -> (T, f64) {
    let started = Instant::now();
    let result = query();
    let elapsed = started.elapsed().as_secs_f64();

    telemetry.record_metric(
        DATABASE_QUERY_DURATION_SECONDS,
        MetricKind::Histogram,
        elapsed,
        Labels::from([
            ("operation".to_string(), operation.to_string()),
            ("table".to_string(), "tasks".to_string()),
        ]),
    );
    (result, elapsed)
}
