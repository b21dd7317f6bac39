//! W3C trace-context propagation.
//!
//! The `traceparent` header carries the caller's trace ID, span ID and
//! sampling decision across process boundaries:
//!
//! `traceparent: 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01`
//!
//! The four fields are version, trace ID, parent span ID and trace flags.
//! Only the sampled bit of the flags is kept.

use crate::models::{IdParseError, SpanId, TraceContext, TraceId};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Name of the trace-context header.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// The only version this module emits.
pub const SUPPORTED_VERSION: u8 = 0;

/// Sampled bit of the trace flags.
pub const FLAG_SAMPLED: u8 = 0x01;

const INVALID_VERSION: u8 = 0xff;

/// Errors that can occur when parsing a `traceparent` header.
#[derive(Debug, Error, PartialEq)]
pub enum TraceParentError {
    /// Fewer than four dash-separated fields.
    #[error("Expected at least 4 fields, got {0}")]
    MissingFields(usize),

    /// Version 00 headers must have exactly four fields.
    #[error("Version 00 requires exactly 4 fields, got {0}")]
    ExtraFields(usize),

    /// Version field is malformed or forbidden.
    #[error("Invalid version: '{0}'")]
    InvalidVersion(String),

    /// Trace ID field is malformed.
    #[error("Invalid trace ID: {0}")]
    InvalidTraceId(IdParseError),

    /// Parent span ID field is malformed.
    #[error("Invalid parent ID: {0}")]
    InvalidParentId(IdParseError),

    /// Flags field is malformed or has unknown bits set for version 00.
    #[error("Invalid flags: '{0}'")]
    InvalidFlags(String),
}

/// A parsed `traceparent` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceParent {
    /// Header version.
    pub version: u8,
    /// The caller's trace ID.
    pub trace_id: TraceId,
    /// The caller's span ID.
    pub parent_id: SpanId,
    /// Trace flags, reduced to the sampled bit.
    pub flags: u8,
}

fn parse_byte(field: &str) -> Option<u8> {
    if field.len() != 2 || field.chars().any(|c| c.is_ascii_uppercase()) {
        return None;
    }
    u8::from_str_radix(field, 16).ok()
}

impl TraceParent {
    /// Builds a version 00 header value for `ctx`.
    #[must_use]
    pub fn from_context(ctx: &TraceContext) -> Self {
        Self {
            version: SUPPORTED_VERSION,
            trace_id: ctx.trace_id,
            parent_id: ctx.span_id,
            flags: if ctx.sampled { FLAG_SAMPLED } else { 0 },
        }
    }

    /// Parses a header value.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - There are fewer than four fields, or more than four for version 00
    /// - Any field is not lowercase hex of the exact width
    /// - The version is `ff`
    /// - Either ID is all zeros
    /// - Version 00 flags are above `02`
    ///
    /// # Example
    ///
    /// ```
    /// use shared::propagation::TraceParent;
    ///
    /// let tp = TraceParent::parse("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01").unwrap();
    /// assert!(tp.is_sampled());
    /// assert_eq!(tp.trace_id.to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
    /// ```
    pub fn parse(value: &str) -> Result<Self, TraceParentError> {
        let parts: Vec<&str> = value.trim().split_terminator('-').collect();
        if parts.len() < 4 {
            return Err(TraceParentError::MissingFields(parts.len()));
        }

        let version = parse_byte(parts[0])
            .filter(|v| *v != INVALID_VERSION)
            .ok_or_else(|| TraceParentError::InvalidVersion(parts[0].to_string()))?;
        if version == SUPPORTED_VERSION && parts.len() != 4 {
            return Err(TraceParentError::ExtraFields(parts.len()));
        }

        let trace_id = TraceId::from_hex(parts[1]).map_err(TraceParentError::InvalidTraceId)?;
        let parent_id = SpanId::from_hex(parts[2]).map_err(TraceParentError::InvalidParentId)?;

        let flags = parse_byte(parts[3])
            .filter(|f| version != SUPPORTED_VERSION || *f <= 2)
            .ok_or_else(|| TraceParentError::InvalidFlags(parts[3].to_string()))?;

        Ok(Self {
            version,
            trace_id,
            parent_id,
            flags: flags & FLAG_SAMPLED,
        })
    }

    /// Returns true if the caller sampled this trace.
    #[must_use]
    pub fn is_sampled(&self) -> bool {
        self.flags & FLAG_SAMPLED != 0
    }

    /// Returns the caller's context as seen from this process.
    #[must_use]
    pub fn remote_context(&self) -> TraceContext {
        TraceContext {
            trace_id: self.trace_id,
            span_id: self.parent_id,
            parent_span_id: None,
            sampled: self.is_sampled(),
        }
    }
}

impl fmt::Display for TraceParent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}-{}-{}-{:02x}",
            SUPPORTED_VERSION,
            self.trace_id,
            self.parent_id,
            self.flags & FLAG_SAMPLED
        )
    }
}

impl FromStr for TraceParent {
    type Err = TraceParentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Read access to a header carrier.
pub trait Extractor {
    /// Returns the value for `key`, compared case-insensitively.
    fn get(&self, key: &str) -> Option<&str>;
}

/// Write access to a header carrier.
pub trait Injector {
    /// Sets `key` to `value`, replacing any existing value.
    fn set(&mut self, key: &str, value: String);
}

impl Extractor for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key)
            .or_else(|| {
                self.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}

impl Injector for HashMap<String, String> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_ascii_lowercase(), value);
    }
}

impl Extractor for http::HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        http::HeaderMap::get(self, key).and_then(|v| v.to_str().ok())
    }
}

impl Injector for http::HeaderMap {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(key.as_bytes()),
            http::HeaderValue::from_str(&value),
        ) {
            self.insert(name, value);
        }
    }
}

/// Reads the caller's context from a carrier.
///
/// Returns `None` when the header is absent or malformed.
pub fn extract(carrier: &dyn Extractor) -> Option<TraceContext> {
    let value = carrier.get(TRACEPARENT_HEADER)?;
    match TraceParent::parse(value) {
        Ok(tp) => Some(tp.remote_context()),
        Err(e) => {
            tracing::debug!(error = %e, header = value, "Ignoring malformed traceparent");
            None
        }
    }
}

/// Writes `ctx` into a carrier as a `traceparent` header.
pub fn inject(ctx: &TraceContext, carrier: &mut dyn Injector) {
    carrier.set(
        TRACEPARENT_HEADER,
        TraceParent::from_context(ctx).to_string(),
    );
}
