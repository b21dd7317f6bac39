//! In-process telemetry emission.
//!
//! A [`Telemetry`] value is created once per process and passed to whatever
//! needs to emit. It owns the process [`Resource`] and one batch buffer per
//! signal. Every emission call queues without waiting; only the buffers'
//! background tasks touch the network.
//!
//! # Example
//!
//! ```
//! use shared::emitter::Telemetry;
//! use shared::export::InMemoryExporter;
//! use shared::models::{Attributes, Labels, MetricKind, Resource, Severity};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let spans = InMemoryExporter::new();
//! let telemetry = Telemetry::builder(Resource::new("flask-backend"))
//!     .with_traces_exporter(Arc::new(spans.clone()))
//!     .build()
//!     .unwrap();
//!
//! let headers: HashMap<String, String> = HashMap::new();
//! let ctx = telemetry.begin_request(&headers);
//!
//! let span = telemetry.start_span("db.query", Some(&ctx));
//! span.log(Severity::Info, "Fetching all tasks", Attributes::new());
//! span.end();
//!
//! telemetry.record_metric("tasks_listed_total", MetricKind::Counter, 1.0, Labels::new());
//! telemetry.force_flush().await.unwrap();
//!
//! assert_eq!(spans.records()[0].trace_id, ctx.trace_id);
//! # }
//! ```

pub mod config;
pub mod request;
pub mod span;

pub use config::TelemetryConfig;
pub use request::{
    RequestScope, DATABASE_QUERY_DURATION_SECONDS, HTTP_ERRORS_TOTAL, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION_SECONDS,
};
pub use span::SpanHandle;

use crate::config::{BatchConfig, ConfigError, RetryConfig};
use crate::export::{DebugExporter, ExportStatsSnapshot, Exporter, HttpExporter};
use crate::models::{
    Attributes, Envelope, Labels, LogRecord, MetricKind, MetricPoint, Resource, Severity, Signal,
    SignalRecord, Span, SpanKind, TraceContext, DEFAULT_BUCKETS,
};
use crate::pipeline::{BatchError, BatchProcessor, ExportTarget};
use crate::propagation::{self, Extractor};
use request::request_attributes;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Emission counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelemetryStats {
    /// Span export counters.
    pub traces: ExportStatsSnapshot,
    /// Metric export counters.
    pub metrics: ExportStatsSnapshot,
    /// Log export counters.
    pub logs: ExportStatsSnapshot,
    /// Metric points refused by validation.
    pub invalid_metrics: u64,
}

struct Inner {
    resource: Arc<Resource>,
    spans: BatchProcessor<Span>,
    metrics: BatchProcessor<MetricPoint>,
    logs: BatchProcessor<LogRecord>,
    invalid_metrics: AtomicU64,
}

/// Handle to the process's telemetry buffers.
///
/// Cheap to clone; clones share the same buffers.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("service", &self.inner.resource.service_name)
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    /// Starts building a telemetry handle for `resource`.
    #[must_use]
    pub fn builder(resource: Resource) -> TelemetryBuilder {
        TelemetryBuilder::new(resource)
    }

    /// Builds a handle that exports every signal over HTTP to the configured
    /// collector.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint URL is invalid or an HTTP client
    /// cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn from_config(config: &TelemetryConfig) -> anyhow::Result<Self> {
        let timeout = config.retry.attempt_timeout;
        let traces = HttpExporter::<Span>::json(config.signal_endpoint(Signal::Traces)?, timeout)?;
        let metrics =
            HttpExporter::<MetricPoint>::json(config.signal_endpoint(Signal::Metrics)?, timeout)?;
        let logs = HttpExporter::<LogRecord>::json(config.signal_endpoint(Signal::Logs)?, timeout)?;

        Ok(Self::builder(config.resource.clone())
            .with_traces_exporter(Arc::new(traces))
            .with_metrics_exporter(Arc::new(metrics))
            .with_logs_exporter(Arc::new(logs))
            .with_batch_config(config.batch)
            .with_retry_config(config.retry)
            .build()?)
    }

    /// Identity attached to everything this handle emits.
    #[must_use]
    pub fn resource(&self) -> &Arc<Resource> {
        &self.inner.resource
    }

    /// Works out the context for an incoming request.
    ///
    /// A valid `traceparent` header continues the caller's trace: same trace
    /// ID, a fresh span ID, the caller's span as parent and its sampling
    /// decision. A missing or malformed header starts a new root trace.
    #[must_use]
    pub fn begin_request(&self, headers: &dyn Extractor) -> TraceContext {
        propagation::extract(headers).map_or_else(TraceContext::new_root, |remote| remote.child())
    }

    /// Opens the server span of an incoming request and logs
    /// `Incoming request`.
    #[must_use]
    pub fn begin_server_request(
        &self,
        headers: &dyn Extractor,
        method: &str,
        route: &str,
    ) -> RequestScope {
        let ctx = self.begin_request(headers);
        let mut span = SpanHandle::start(
            self.clone(),
            ctx,
            format!("{method} {route}"),
            SpanKind::Server,
        );
        span.set_attribute("http.request.method", method);
        span.set_attribute("http.route", route);

        self.emit_log(
            Severity::Info,
            "Incoming request",
            request_attributes(method, route),
            Some(&ctx),
        );

        RequestScope {
            span,
            method: method.to_string(),
            route: route.to_string(),
            started: Instant::now(),
        }
    }

    /// Opens a span as a child of `parent`, or as a new root when `parent` is
    /// `None`.
    #[must_use]
    pub fn start_span(&self, name: impl Into<String>, parent: Option<&TraceContext>) -> SpanHandle {
        self.start_span_with_kind(name, parent, SpanKind::Internal)
    }

    /// Like [`start_span`](Self::start_span) with an explicit kind.
    #[must_use]
    pub fn start_span_with_kind(
        &self,
        name: impl Into<String>,
        parent: Option<&TraceContext>,
        kind: SpanKind,
    ) -> SpanHandle {
        let ctx = parent.map_or_else(TraceContext::new_root, TraceContext::child);
        SpanHandle::start(self.clone(), ctx, name.into(), kind)
    }

    /// Records one metric observation.
    ///
    /// Histograms are recorded against the default latency buckets. Invalid
    /// points and points that do not fit in the buffer are dropped and
    /// counted. Returns true if the point was queued.
    pub fn record_metric(
        &self,
        name: impl Into<String>,
        kind: MetricKind,
        value: f64,
        labels: Labels,
    ) -> bool {
        let point = match kind {
            MetricKind::Counter => MetricPoint::counter(name, value),
            MetricKind::Gauge => MetricPoint::gauge(name, value),
            MetricKind::Histogram => MetricPoint::histogram(name, value, DEFAULT_BUCKETS),
        };
        self.record_point(point.with_labels(labels))
    }

    /// Records a fully built metric point.
    ///
    /// Returns true if the point was queued.
    pub fn record_point(&self, point: MetricPoint) -> bool {
        if let Err(e) = point.validate_point() {
            self.inner.invalid_metrics.fetch_add(1, Ordering::Relaxed);
            debug!(metric = %point.name, error = %e, "Dropping invalid metric point");
            return false;
        }
        self.inner
            .metrics
            .emit(Envelope::new(Arc::clone(&self.inner.resource), point))
    }

    /// Emits a log record.
    ///
    /// When `ctx` is given, its trace and span IDs are added to the record's
    /// attributes before it is queued.
    pub fn emit_log(
        &self,
        severity: Severity,
        message: impl Into<String>,
        attributes: Attributes,
        ctx: Option<&TraceContext>,
    ) -> bool {
        let mut record = LogRecord::new(severity, message).with_attributes(attributes);
        if let Some(ctx) = ctx {
            record = record.with_context(ctx);
        }
        self.inner
            .logs
            .emit(Envelope::new(Arc::clone(&self.inner.resource), record))
    }

    /// Closes a request: final status on the server span, RED metrics and
    /// the `Request completed` log.
    ///
    /// Status codes of 500 and above mark the span as failed; 400 and above
    /// count as errors in `http_errors_total`.
    pub fn end_request(&self, scope: RequestScope, status_code: u16) {
        let ctx = scope.context();
        let method = scope.method.clone();
        let route = scope.route.clone();
        let (span, elapsed) = scope.finish(status_code);

        let labels = Labels::from([
            ("method".to_string(), method.clone()),
            ("endpoint".to_string(), route.clone()),
            ("status_code".to_string(), status_code.to_string()),
        ]);

        self.record_metric(HTTP_REQUESTS_TOTAL, MetricKind::Counter, 1.0, labels.clone());
        self.record_metric(
            HTTP_REQUEST_DURATION_SECONDS,
            MetricKind::Histogram,
            elapsed,
            labels.clone(),
        );
        if status_code >= 400 {
            self.record_metric(HTTP_ERRORS_TOTAL, MetricKind::Counter, 1.0, labels);
        }

        let mut attributes = request_attributes(&method, &route);
        attributes.insert("status_code".to_string(), status_code.into());
        attributes.insert("duration_seconds".to_string(), elapsed.into());
        let severity = if status_code >= 500 {
            Severity::Error
        } else {
            Severity::Info
        };
        self.emit_log(severity, "Request completed", attributes, Some(&ctx));

        span.end();
    }

    /// Exports everything buffered so far and waits for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle has been shut down.
    pub async fn force_flush(&self) -> Result<(), BatchError> {
        self.inner.spans.force_flush().await?;
        self.inner.metrics.force_flush().await?;
        self.inner.logs.force_flush().await
    }

    /// Flushes and stops the background export tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle was already shut down.
    pub async fn shutdown(&self) -> Result<(), BatchError> {
        self.inner.spans.shutdown().await?;
        self.inner.metrics.shutdown().await?;
        self.inner.logs.shutdown().await
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            traces: self.inner.spans.stats(),
            metrics: self.inner.metrics.stats(),
            logs: self.inner.logs.stats(),
            invalid_metrics: self.inner.invalid_metrics.load(Ordering::Relaxed),
        }
    }
}

fn or_debug<T: SignalRecord>(exporter: Option<Arc<dyn Exporter<T>>>) -> Arc<dyn Exporter<T>> {
    match exporter {
        Some(exporter) => exporter,
        None => Arc::new(DebugExporter::default()),
    }
}

/// Builder for [`Telemetry`].
///
/// Signals without an explicit exporter go to a [`DebugExporter`].
pub struct TelemetryBuilder {
    resource: Resource,
    traces: Option<Arc<dyn Exporter<Span>>>,
    metrics: Option<Arc<dyn Exporter<MetricPoint>>>,
    logs: Option<Arc<dyn Exporter<LogRecord>>>,
    batch: BatchConfig,
    retry: RetryConfig,
}

impl TelemetryBuilder {
    fn new(resource: Resource) -> Self {
        Self {
            resource,
            traces: None,
            metrics: None,
            logs: None,
            batch: BatchConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the span exporter.
    #[must_use]
    pub fn with_traces_exporter(mut self, exporter: Arc<dyn Exporter<Span>>) -> Self {
        self.traces = Some(exporter);
        self
    }

    /// Sets the metric exporter.
    #[must_use]
    pub fn with_metrics_exporter(mut self, exporter: Arc<dyn Exporter<MetricPoint>>) -> Self {
        self.metrics = Some(exporter);
        self
    }

    /// Sets the log exporter.
    #[must_use]
    pub fn with_logs_exporter(mut self, exporter: Arc<dyn Exporter<LogRecord>>) -> Self {
        self.logs = Some(exporter);
        self
    }

    /// Sets the batching thresholds.
    #[must_use]
    pub fn with_batch_config(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Starts the background export tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch or retry settings are out of range.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn build(self) -> Result<Telemetry, ConfigError> {
        self.batch.validate()?;
        self.retry.validate()?;

        let traces = or_debug(self.traces);
        let metrics = or_debug(self.metrics);
        let logs = or_debug(self.logs);

        Ok(Telemetry {
            inner: Arc::new(Inner {
                resource: Arc::new(self.resource),
                spans: BatchProcessor::new(
                    ExportTarget::new(traces),
                    self.batch,
                    self.retry,
                ),
                metrics: BatchProcessor::new(
                    ExportTarget::new(metrics),
                    self.batch,
                    self.retry,
                ),
                logs: BatchProcessor::new(ExportTarget::new(logs), self.batch, self.retry),
                invalid_metrics: AtomicU64::new(0),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::InMemoryExporter;
    use crate::models::{AttributeValue, SpanStatus};
    use crate::propagation::TRACEPARENT_HEADER;
    use std::collections::HashMap;

    struct Harness {
        telemetry: Telemetry,
        spans: InMemoryExporter<Span>,
        metrics: InMemoryExporter<MetricPoint>,
        logs: InMemoryExporter<LogRecord>,
    }

    fn harness() -> Harness {
        let spans = InMemoryExporter::new();
        let metrics = InMemoryExporter::new();
        let logs = InMemoryExporter::new();
        let telemetry = Telemetry::builder(Resource::new("flask-backend"))
            .with_traces_exporter(Arc::new(spans.clone()))
            .with_metrics_exporter(Arc::new(metrics.clone()))
            .with_logs_exporter(Arc::new(logs.clone()))
            .build()
            .unwrap();
        Harness {
            telemetry,
            spans,
            metrics,
            logs,
        }
    }

    fn headers(traceparent: &str) -> HashMap<String, String> {
        HashMap::from([(TRACEPARENT_HEADER.to_string(), traceparent.to_string())])
    }

    #[tokio::test]
    async fn test_begin_request_continues_incoming_trace() {
        let h = harness();
        let ctx = h.telemetry.begin_request(&headers(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        ));

        assert_eq!(ctx.trace_id.to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(
            ctx.parent_span_id.map(|s| s.to_string()).as_deref(),
            Some("00f067aa0ba902b7")
        );
        assert_ne!(ctx.span_id.to_string(), "00f067aa0ba902b7");
        assert!(ctx.sampled);
    }

    #[tokio::test]
    async fn test_begin_request_without_header_starts_root() {
        let h = harness();
        let ctx = h.telemetry.begin_request(&HashMap::<String, String>::new());
        assert!(ctx.is_root());
        assert!(ctx.trace_id.is_valid());

        let ctx = h.telemetry.begin_request(&headers("garbage"));
        assert!(ctx.is_root());
    }

    #[tokio::test]
    async fn test_span_sealed_on_drop() {
        let h = harness();
        let root = TraceContext::new_root();

        {
            let mut span = h.telemetry.start_span("early-return", Some(&root));
            span.set_attribute("step", 1);
        }
        h.telemetry.force_flush().await.unwrap();

        let spans = h.spans.records();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].parent_span_id, Some(root.span_id));
        assert!(spans[0].end_time >= spans[0].start_time);
    }

    #[tokio::test]
    async fn test_unsampled_spans_are_not_exported() {
        let h = harness();
        let ctx = h.telemetry.begin_request(&headers(
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00",
        ));
        assert!(!ctx.sampled);

        h.telemetry.start_span("work", Some(&ctx)).end();
        h.telemetry.force_flush().await.unwrap();

        assert!(h.spans.records().is_empty());
    }

    #[tokio::test]
    async fn test_emit_log_injects_context() {
        let h = harness();
        let span = h.telemetry.start_span("handler", None);
        let ctx = span.context();
        span.log(Severity::Info, "Fetching all tasks", Attributes::new());
        h.telemetry
            .emit_log(Severity::Warn, "no context", Attributes::new(), None);
        span.end();
        h.telemetry.force_flush().await.unwrap();

        let logs = h.logs.records();
        assert_eq!(logs[0].trace_id(), Some(ctx.trace_id));
        assert_eq!(logs[0].span_id(), Some(ctx.span_id));
        assert!(logs[1].trace_id().is_none());
    }

    #[tokio::test]
    async fn test_invalid_metric_is_dropped_and_counted() {
        let h = harness();
        assert!(!h
            .telemetry
            .record_metric("requests_total", MetricKind::Counter, -1.0, Labels::new()));
        assert!(h
            .telemetry
            .record_metric("requests_total", MetricKind::Counter, 1.0, Labels::new()));
        h.telemetry.force_flush().await.unwrap();

        assert_eq!(h.telemetry.stats().invalid_metrics, 1);
        assert_eq!(h.metrics.records().len(), 1);
    }

    #[tokio::test]
    async fn test_request_lifecycle_correlates_all_signals() {
        let h = harness();
        let scope = h.telemetry.begin_server_request(
            &headers("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
            "GET",
            "/api/tasks",
        );
        let ctx = scope.context();

        let child = h.telemetry.start_span("db.query", Some(&ctx));
        child.log(Severity::Info, "Retrieved 3 tasks", Attributes::new());
        child.end();

        h.telemetry.end_request(scope, 200);
        h.telemetry.force_flush().await.unwrap();

        let spans = h.spans.records();
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().all(|s| s.trace_id == ctx.trace_id));
        let server = spans.iter().find(|s| s.kind == SpanKind::Server).unwrap();
        assert_eq!(server.name, "GET /api/tasks");
        assert_eq!(
            server.attributes.get("http.response.status_code"),
            Some(&AttributeValue::Int(200))
        );
        assert_eq!(server.status, SpanStatus::Ok);

        let logs = h.logs.records();
        let messages: Vec<&str> = logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["Incoming request", "Retrieved 3 tasks", "Request completed"]);
        assert!(logs.iter().all(|l| l.trace_id() == Some(ctx.trace_id)));

        let names: Vec<String> = h.metrics.records().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec![HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS]);
    }

    #[tokio::test]
    async fn test_server_error_marks_span_and_counts_error() {
        let h = harness();
        let scope = h.telemetry.begin_server_request(
            &HashMap::<String, String>::new(),
            "GET",
            "/api/simulate-error",
        );
        h.telemetry.end_request(scope, 500);
        h.telemetry.force_flush().await.unwrap();

        let spans = h.spans.records();
        assert!(spans[0].status.is_error());

        let metrics = h.metrics.records();
        let errors = metrics.iter().find(|m| m.name == HTTP_ERRORS_TOTAL).unwrap();
        assert_eq!(errors.labels.get("status_code").map(String::as_str), Some("500"));
        assert_eq!(errors.labels.get("endpoint").map(String::as_str), Some("/api/simulate-error"));

        let completed = h.logs.records().into_iter().last().unwrap();
        assert_eq!(completed.severity, Severity::Error);
        assert!(matches!(
            completed.attributes.get("duration_seconds"),
            Some(AttributeValue::Float(_))
        ));
        assert!(!completed.attributes.contains_key("duration_ms"));
    }

    #[tokio::test]
    async fn test_build_rejects_empty_queue() {
        let result = Telemetry::builder(Resource::new("flask-backend"))
            .with_batch_config(BatchConfig::default().with_max_queue_size(0))
            .build();
        assert!(matches!(result, Err(ConfigError::OutOfRange(_))));
    }

    #[tokio::test]
    async fn test_build_rejects_batch_larger_than_queue() {
        let batch = BatchConfig::default()
            .with_max_queue_size(16)
            .with_max_export_batch_size(32);
        let result = Telemetry::builder(Resource::new("flask-backend"))
            .with_batch_config(batch)
            .build();
        assert!(result.is_err());
    }
}
