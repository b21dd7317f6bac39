//! Data models for the telemetry pipeline.
//!
//! This module contains the core data structures for spans, metric points and
//! log records, the trace context that correlates them, and the resource that
//! identifies the service producing them.

pub mod attributes;
pub mod context;
pub mod envelope;
pub mod log;
pub mod metric;
pub mod resource;
pub mod trace;

pub use attributes::{AttributeValue, Attributes, Labels};
pub use context::{IdParseError, SpanId, TraceContext, TraceId};
pub use envelope::{group_by_resource, Envelope, Signal, SignalRecord, WireBatch};
pub use log::{LogRecord, LogValidationError, Severity};
pub use metric::{
    HistogramBucket, HistogramData, MetricKind, MetricPoint, MetricValidationError, MetricValue,
    DEFAULT_BUCKETS,
};
pub use resource::{Resource, ResourceValidationError};
pub use trace::{
    group_by_trace, Span, SpanEvent, SpanKind, SpanStatus, SpanValidationError, Trace,
    TraceTreeError,
};
