//! Log data model.
//!
//! Defines the `LogRecord` structure: one structured log event, usually
//! carrying the trace and span IDs of the request that produced it.

use super::attributes::{AttributeValue, Attributes, Labels};
use super::context::{SpanId, TraceContext, TraceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Attribute key holding the trace ID of a correlated log record.
pub const TRACE_ID_KEY: &str = "trace_id";

/// Attribute key holding the span ID of a correlated log record.
pub const SPAN_ID_KEY: &str = "span_id";

/// Log severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Detailed debug information.
    Trace,
    /// Debug information.
    Debug,
    /// Informational messages.
    #[default]
    Info,
    /// Warning conditions.
    Warn,
    /// Error conditions.
    Error,
    /// Critical/fatal conditions.
    Fatal,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// A single structured log event.
///
/// The producing service's identity travels separately as a shared
/// [`Resource`](super::Resource); `labels` are the indexed labels a log
/// backend selects streams by, assigned by the collector.
///
/// # Example
///
/// ```
/// use shared::models::{LogRecord, Severity, TraceContext};
///
/// let ctx = TraceContext::new_root();
/// let log = LogRecord::new(Severity::Info, "Request completed")
///     .with_attribute("status_code", 200)
///     .with_context(&ctx);
///
/// assert_eq!(log.trace_id(), Some(ctx.trace_id));
/// assert!(log.validate_record().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LogRecord {
    /// Timestamp when the log event occurred.
    pub timestamp: DateTime<Utc>,

    /// Severity level.
    #[serde(default)]
    pub severity: Severity,

    /// The log message.
    #[validate(length(min = 1, message = "Log message cannot be empty"))]
    pub message: String,

    /// Structured attributes.
    #[serde(default)]
    pub attributes: Attributes,

    /// Indexed labels.
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

/// Errors that can occur during log validation.
#[derive(Debug, Error)]
pub enum LogValidationError {
    /// The log message is empty.
    #[error("Log message cannot be empty")]
    EmptyMessage,

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

impl LogRecord {
    /// Creates a new log record with the current timestamp.
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            attributes: Attributes::new(),
            labels: Labels::new(),
        }
    }

    /// Adds an attribute to the record.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Merges a set of attributes into the record.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Stamps the record with the trace and span ID of `ctx`.
    #[must_use]
    pub fn with_context(mut self, ctx: &TraceContext) -> Self {
        self.attributes
            .insert(TRACE_ID_KEY.to_string(), ctx.trace_id.to_string().into());
        self.attributes
            .insert(SPAN_ID_KEY.to_string(), ctx.span_id.to_string().into());
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns the trace ID stored in the attributes, if any.
    #[must_use]
    pub fn trace_id(&self) -> Option<TraceId> {
        self.attributes
            .get(TRACE_ID_KEY)
            .and_then(AttributeValue::as_str)
            .and_then(|s| TraceId::from_hex(s).ok())
    }

    /// Returns the span ID stored in the attributes, if any.
    #[must_use]
    pub fn span_id(&self) -> Option<SpanId> {
        self.attributes
            .get(SPAN_ID_KEY)
            .and_then(AttributeValue::as_str)
            .and_then(|s| SpanId::from_hex(s).ok())
    }

    /// Validates the log record.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is empty.
    pub fn validate_record(&self) -> Result<(), LogValidationError> {
        if self.message.is_empty() {
            return Err(LogValidationError::EmptyMessage);
        }
        self.validate()?;
        Ok(())
    }
}
