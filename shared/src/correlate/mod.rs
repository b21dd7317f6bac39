//! Query-time correlation between the three signals.
//!
//! Given one artifact (a span, a log line) these functions derive the query
//! that finds the related artifacts in a sibling backend:
//!
//! - [`TraceToLogs`]: span -> LogQL stream selector plus trace id filter;
//! - [`TraceToMetrics`]: span -> PromQL queries scoped to the span's labels;
//! - [`LogToTrace`]: log line -> trace lookup by id.
//!
//! Derivation is pure. Running the query is left to the backend, and an empty
//! result is a valid answer.
//!
//! # Example
//!
//! ```
//! use shared::correlate::{SpanRef, TraceToLogs};
//! use shared::chrono::Utc;
//!
//! let now = Utc::now();
//! let span = SpanRef::new("4bf92f3577b34da6a3ce929d0e0e4736", now, now)
//!     .with_tag("service.name", "flask-backend");
//!
//! let query = TraceToLogs::default().derive(&span);
//! assert_eq!(
//!     query.query,
//!     r#"{service_name="flask-backend"} |= "4bf92f3577b34da6a3ce929d0e0e4736""#
//! );
//! ```

pub mod logs;
pub mod metrics;
pub mod trace;

pub use logs::{LogQuery, TraceToLogs};
pub use metrics::{MetricQuery, MetricQueryTemplate, TraceToMetrics};
pub use trace::{searchable_text, LogToTrace, TraceLookup, DEFAULT_TRACE_ID_PATTERN};

use crate::models::{resource::keys, Resource, Span};
use crate::pipeline::enrich::label_name;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Errors raised while building correlation queries.
#[derive(Debug, Error)]
pub enum CorrelateError {
    /// The trace id pattern does not compile.
    #[error("Invalid trace id pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The trace id pattern has no capture group.
    #[error("Trace id pattern must have a capture group: {0}")]
    MissingCaptureGroup(String),

    /// A backend base URL cannot carry a path.
    #[error("Backend URL cannot be a base: {0}")]
    CannotBeABase(String),
}

/// Maps a span tag to a label of the target backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMapping {
    /// Span or resource attribute key.
    pub tag: String,
    /// Label name in the target backend.
    pub label: String,
}

impl TagMapping {
    /// Creates a mapping.
    #[must_use]
    pub fn new(tag: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            label: label.into(),
        }
    }

    /// Maps a tag to the label the collector promotes it to.
    #[must_use]
    pub fn promoted(tag: &str) -> Self {
        Self::new(tag, label_name(tag))
    }
}

/// `service.name` -> `service_name`.
#[must_use]
pub fn default_tag_mappings() -> Vec<TagMapping> {
    vec![TagMapping::promoted(keys::SERVICE_NAME)]
}

/// The parts of a span that correlation looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanRef {
    /// Trace id as it appears in the source data.
    pub trace_id: String,
    /// Span start.
    pub start: DateTime<Utc>,
    /// Span end.
    pub end: DateTime<Utc>,
    /// Span and resource tags rendered as strings.
    pub tags: BTreeMap<String, String>,
}

impl SpanRef {
    /// Creates a reference with no tags.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            trace_id: trace_id.into(),
            start,
            end,
            tags: BTreeMap::new(),
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Collects tags from a span and the resource that produced it.
    ///
    /// Span attributes win over resource attributes with the same key.
    #[must_use]
    pub fn from_span(span: &Span, resource: &Resource) -> Self {
        let mut tags = BTreeMap::new();
        for key in [
            keys::SERVICE_NAME,
            keys::SERVICE_VERSION,
            keys::DEPLOYMENT_ENVIRONMENT,
            keys::SERVICE_INSTANCE_ID,
        ] {
            if let Some(value) = resource.attribute(key) {
                tags.insert(key.to_string(), value);
            }
        }
        for (key, value) in &resource.attributes {
            tags.insert(key.clone(), value.to_string());
        }
        for (key, value) in &span.attributes {
            tags.insert(key.clone(), value.to_string());
        }

        Self {
            trace_id: span.trace_id.to_string(),
            start: span.start_time,
            end: span.end_time,
            tags,
        }
    }

    /// The span's time range widened by `padding` on both sides.
    #[must_use]
    pub fn padded_range(&self, padding: Duration) -> TimeRange {
        TimeRange {
            start: self.start - padding,
            end: self.end.max(self.start) + padding,
        }
    }

    /// `label="value"` matchers for every mapped tag the span carries, in
    /// mapping order.
    fn matchers(&self, mappings: &[TagMapping]) -> Vec<String> {
        mappings
            .iter()
            .filter_map(|m| {
                self.tags
                    .get(&m.tag)
                    .map(|value| format!("{}={}", m.label, quote(value)))
            })
            .collect()
    }
}

/// A closed time interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Inclusive end.
    pub end: DateTime<Utc>,
}

/// Renders a string literal for LogQL and PromQL.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Appends path segments to a backend base URL.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, CorrelateError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| CorrelateError::CannotBeABase(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
