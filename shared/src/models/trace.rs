//! Trace and span data models.
//!
//! Defines the core structures for distributed tracing.

use super::attributes::{AttributeValue, Attributes};
use super::context::{SpanId, TraceContext, TraceId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use validator::Validate;

/// Final status of a span.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "code", rename_all = "lowercase")]
pub enum SpanStatus {
    /// The span completed without error.
    #[default]
    Ok,
    /// The span encountered an error.
    Error {
        /// Optional human-readable error detail.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl SpanStatus {
    /// Creates an error status with a description.
    #[must_use]
    pub fn error(description: impl Into<String>) -> Self {
        Self::Error {
            description: Some(description.into()),
        }
    }

    /// Returns true if this is an error status.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl std::fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error { .. } => write!(f, "error"),
        }
    }
}

/// Kind of span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    /// Default span kind (internal operation).
    #[default]
    Internal,
    /// The span represents a server handling a request.
    Server,
    /// The span represents a client making a request.
    Client,
    /// The span represents a producer sending a message.
    Producer,
    /// The span represents a consumer receiving a message.
    Consumer,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::Server => write!(f, "server"),
            Self::Client => write!(f, "client"),
            Self::Producer => write!(f, "producer"),
            Self::Consumer => write!(f, "consumer"),
        }
    }
}

/// A timestamped annotation within a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    /// The name of the event.
    pub name: String,
    /// Timestamp when the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Additional attributes for the event.
    #[serde(default)]
    pub attributes: Attributes,
}

/// A span representing a unit of work in a distributed trace.
///
/// # Example
///
/// ```
/// use shared::models::{Span, SpanKind, TraceContext};
///
/// let ctx = TraceContext::new_root();
/// let span = Span::new(&ctx, "GET /api/tasks")
///     .with_kind(SpanKind::Server)
///     .with_attribute("http.request.method", "GET")
///     .with_attribute("http.response.status_code", 200);
///
/// assert!(span.is_root());
/// assert!(span.validate_span().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Span {
    /// The trace this span belongs to.
    pub trace_id: TraceId,

    /// Unique identifier for this span within its trace.
    pub span_id: SpanId,

    /// The parent span ID (None for root spans).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,

    /// The name/operation of this span.
    #[validate(length(min = 1, message = "Span name cannot be empty"))]
    pub name: String,

    /// The kind of span.
    #[serde(default)]
    pub kind: SpanKind,

    /// The status of the span.
    #[serde(default)]
    pub status: SpanStatus,

    /// Timestamp when the span started.
    pub start_time: DateTime<Utc>,

    /// Timestamp when the span ended.
    pub end_time: DateTime<Utc>,

    /// Additional attributes for the span.
    #[serde(default)]
    pub attributes: Attributes,

    /// Events that occurred during the span, in order.
    #[serde(default)]
    pub events: Vec<SpanEvent>,
}

/// Errors that can occur during span validation.
#[derive(Debug, Error)]
pub enum SpanValidationError {
    /// The span name is empty.
    #[error("Span name cannot be empty")]
    EmptyName,

    /// The end time is before the start time.
    #[error("End time cannot be before start time")]
    InvalidTimeRange,

    /// The span points at itself as its parent.
    #[error("Span cannot be its own parent")]
    SelfParent,

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

impl Span {
    /// Creates a new span for the given context with the current time as
    /// both start and end.
    #[must_use]
    pub fn new(context: &TraceContext, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            trace_id: context.trace_id,
            span_id: context.span_id,
            parent_span_id: context.parent_span_id,
            name: name.into(),
            kind: SpanKind::default(),
            status: SpanStatus::default(),
            start_time: now,
            end_time: now,
            attributes: Attributes::new(),
            events: Vec::new(),
        }
    }

    /// Sets the parent span ID.
    #[must_use]
    pub fn with_parent(mut self, parent_span_id: SpanId) -> Self {
        self.parent_span_id = Some(parent_span_id);
        self
    }

    /// Sets the span kind.
    #[must_use]
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the span status.
    #[must_use]
    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the start time.
    #[must_use]
    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    /// Sets the end time.
    #[must_use]
    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = end_time;
        self
    }

    /// Adds an attribute to the span.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds an event to the span.
    #[must_use]
    pub fn with_event(mut self, name: impl Into<String>) -> Self {
        self.events.push(SpanEvent {
            name: name.into(),
            timestamp: Utc::now(),
            attributes: Attributes::new(),
        });
        self
    }

    /// Returns the trace context identifying this span.
    #[must_use]
    pub fn context(&self) -> TraceContext {
        TraceContext {
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_span_id: self.parent_span_id,
            sampled: true,
        }
    }

    /// Returns the duration of the span.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        self.duration().num_milliseconds()
    }

    /// Returns true if this is a root span (no parent).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Validates the span.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The name is empty
    /// - The end time is before the start time
    /// - The span is its own parent
    pub fn validate_span(&self) -> Result<(), SpanValidationError> {
        if self.name.is_empty() {
            return Err(SpanValidationError::EmptyName);
        }
        if self.end_time < self.start_time {
            return Err(SpanValidationError::InvalidTimeRange);
        }
        if self.parent_span_id == Some(self.span_id) {
            return Err(SpanValidationError::SelfParent);
        }
        self.validate()?;
        Ok(())
    }
}

/// Errors describing a span set that does not form a valid trace tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TraceTreeError {
    /// Spans from more than one trace were grouped together.
    #[error("Span {0} belongs to a different trace")]
    MixedTraceIds(SpanId),

    /// Two spans share a span ID.
    #[error("Duplicate span ID: {0}")]
    DuplicateSpanId(SpanId),

    /// A span's parent is not part of the trace.
    #[error("Span {span_id} references missing parent {parent_span_id}")]
    MissingParent {
        /// The orphaned span.
        span_id: SpanId,
        /// The parent that could not be found.
        parent_span_id: SpanId,
    },

    /// No span without a parent exists.
    #[error("Trace has no root span")]
    NoRoot,

    /// More than one span without a parent exists.
    #[error("Trace has {0} root spans")]
    MultipleRoots(usize),
}

/// A trace consisting of multiple spans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// The trace ID.
    pub trace_id: TraceId,

    /// All spans in this trace.
    pub spans: Vec<Span>,

    /// The root span (if any).
    #[serde(skip)]
    root_span_index: Option<usize>,
}

impl Trace {
    /// Creates a new trace from a collection of spans.
    #[must_use]
    pub fn from_spans(spans: Vec<Span>) -> Option<Self> {
        let trace_id = spans.first()?.trace_id;
        let root_span_index = spans.iter().position(Span::is_root);

        Some(Self {
            trace_id,
            spans,
            root_span_index,
        })
    }

    /// Returns the root span if it exists.
    #[must_use]
    pub fn root_span(&self) -> Option<&Span> {
        self.root_span_index.map(|i| &self.spans[i])
    }

    /// Returns the direct children of a span.
    #[must_use]
    pub fn children(&self, span_id: SpanId) -> Vec<&Span> {
        self.spans
            .iter()
            .filter(|s| s.parent_span_id == Some(span_id))
            .collect()
    }

    /// Returns the total duration of the trace (from earliest start to latest end).
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        let start = self.spans.iter().map(|s| s.start_time).min()?;
        let end = self.spans.iter().map(|s| s.end_time).max()?;

        Some(end - start)
    }

    /// Returns the number of spans in this trace.
    #[must_use]
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// Checks that the spans form a single tree.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found: a span from another
    /// trace, a duplicate span ID, a dangling parent reference, or a
    /// missing or repeated root.
    pub fn validate_tree(&self) -> Result<(), TraceTreeError> {
        let mut ids = HashSet::with_capacity(self.spans.len());
        for span in &self.spans {
            if span.trace_id != self.trace_id {
                return Err(TraceTreeError::MixedTraceIds(span.span_id));
            }
            if !ids.insert(span.span_id) {
                return Err(TraceTreeError::DuplicateSpanId(span.span_id));
            }
        }

        let mut roots = 0;
        for span in &self.spans {
            match span.parent_span_id {
                None => roots += 1,
                Some(parent) if !ids.contains(&parent) => {
                    return Err(TraceTreeError::MissingParent {
                        span_id: span.span_id,
                        parent_span_id: parent,
                    });
                }
                Some(_) => {}
            }
        }

        match roots {
            0 => Err(TraceTreeError::NoRoot),
            1 => Ok(()),
            n => Err(TraceTreeError::MultipleRoots(n)),
        }
    }
}

/// Groups spans by trace ID, preserving arrival order within each trace.
#[must_use]
pub fn group_by_trace(spans: Vec<Span>) -> HashMap<TraceId, Vec<Span>> {
    let mut traces: HashMap<TraceId, Vec<Span>> = HashMap::new();
    for span in spans {
        traces.entry(span.trace_id).or_default().push(span);
    }
    traces
}
