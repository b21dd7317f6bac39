//! `pillars emit`: push one synthetic request through the emitter.

use anyhow::Result;
use serde_json::{json, Value};
use shared::emitter::{Telemetry, TelemetryConfig};
use shared::models::{Attributes, Severity, SpanKind};
use shared::propagation::TraceParent;
use std::collections::HashMap;

/// Emits a server span with one client child span, its logs and RED
/// metrics, then flushes everything to `endpoint`.
///
/// Returns the trace id and export counters.
///
/// # Errors
///
/// Returns an error if the endpoint is invalid or the emitter was already
/// shut down.
pub async fn run(config: TelemetryConfig) -> Result<Value> {
    let telemetry = Telemetry::from_config(&config)?;

    let headers: HashMap<String, String> = HashMap::new();
    let scope = telemetry.begin_server_request(&headers, "GET", "/cli/emit");
    let ctx = scope.context();

    let mut call =
        telemetry.start_span_with_kind("synthetic downstream call", Some(&ctx), SpanKind::Client);
    call.set_attribute("pillars.synthetic", true);
    call.log(Severity::Info, "Synthetic request from pillars CLI", Attributes::new());
    call.end();

    telemetry.end_request(scope, 200);
    telemetry.shutdown().await?;

    let stats = telemetry.stats();
    tracing::info!(
        trace_id = %ctx.trace_id,
        spans = stats.traces.exported_records,
        logs = stats.logs.exported_records,
        metrics = stats.metrics.exported_records,
        "Synthetic request exported"
    );

    Ok(json!({
        "trace_id": ctx.trace_id.to_string(),
        "traceparent": TraceParent::from_context(&ctx).to_string(),
        "endpoint": config.endpoint,
        "stats": stats,
    }))
}
