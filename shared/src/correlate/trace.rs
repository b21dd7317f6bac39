//! Log -> Trace.

use super::{endpoint, CorrelateError};
use crate::models::{LogRecord, TraceId};
use regex::Regex;
use url::Url;

/// Matches `trace_id=<hex>`, `"trace_id":"<hex>"`, `traceID: <hex>` and
/// similar spellings. The first capture group is the id.
pub const DEFAULT_TRACE_ID_PATTERN: &str =
    r#"(?i)trace_?id"?\s*[=:]\s*"?([0-9a-f]{32})\b"#;

/// A trace fetch by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceLookup {
    /// The trace to fetch.
    pub trace_id: TraceId,
}

impl TraceLookup {
    /// Tempo `/api/traces/{id}` request for this lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` cannot carry a path.
    pub fn url(&self, base: &Url) -> Result<Url, CorrelateError> {
        endpoint(base, &["api", "traces", &self.trace_id.to_string()])
    }
}

/// Extracts a trace id from a log line.
///
/// At most one id is extracted per line. When the pattern matches several
/// times, the first match that is a valid trace id wins.
#[derive(Debug, Clone)]
pub struct LogToTrace {
    pattern: Regex,
}

impl LogToTrace {
    /// Compiles `pattern`. Its first capture group must hold the trace id.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not compile or has no capture
    /// group.
    pub fn new(pattern: &str) -> Result<Self, CorrelateError> {
        let pattern = Regex::new(pattern)?;
        if pattern.captures_len() < 2 {
            return Err(CorrelateError::MissingCaptureGroup(pattern.to_string()));
        }
        Ok(Self { pattern })
    }

    /// Compiles [`DEFAULT_TRACE_ID_PATTERN`].
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in pattern fails to compile.
    pub fn try_default() -> Result<Self, CorrelateError> {
        Self::new(DEFAULT_TRACE_ID_PATTERN)
    }

    /// Finds the trace id in a raw log line.
    ///
    /// Returns the first match that is a valid trace id. Matches that do not
    /// parse, such as the all-zero id, are skipped and the search continues.
    #[must_use]
    pub fn derive_line(&self, line: &str) -> Option<TraceLookup> {
        self.pattern
            .captures_iter(line)
            .filter_map(|captures| captures.get(1))
            .find_map(|m| TraceId::from_hex(m.as_str()).ok())
            .map(|trace_id| TraceLookup { trace_id })
    }

    /// Finds the trace id in a log record, searching its message and then its
    /// attributes in key order.
    #[must_use]
    pub fn derive(&self, record: &LogRecord) -> Option<TraceLookup> {
        self.derive_line(&searchable_text(record))
    }
}

/// The message followed by ` key=value` for every attribute, sorted by key.
#[must_use]
pub fn searchable_text(record: &LogRecord) -> String {
    let mut attributes: Vec<_> = record.attributes.iter().collect();
    attributes.sort_by(|a, b| a.0.cmp(b.0));

    let mut text = record.message.clone();
    for (key, value) in attributes {
        text.push(' ');
        text.push_str(key);
        text.push('=');
        text.push_str(&value.to_string());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Severity, TraceContext};

    const TRACE: &str = "4bf92f3577b34da6a3ce929d0e0e4736";

    fn correlator() -> LogToTrace {
        LogToTrace::try_default().unwrap()
    }

    #[test]
    fn test_extracts_from_key_value_line() {
        let lookup = correlator()
            .derive_line(&format!("Request completed trace_id={TRACE} status=200"))
            .unwrap();
        assert_eq!(lookup.trace_id.to_string(), TRACE);
    }

    #[test]
    fn test_extracts_from_json_line() {
        let line = format!(r#"{{"message":"Incoming request","trace_id":"{TRACE}"}}"#);
        assert!(correlator().derive_line(&line).is_some());

        let line = format!("traceID: {}", TRACE.to_uppercase());
        assert!(correlator().derive_line(&line).is_none());
    }

    #[test]
    fn test_first_valid_match_wins() {
        let other = "0af7651916cd43dd8448eb211c80319c";
        let line = format!(
            "trace_id={} retry of trace_id={other} then trace_id={TRACE}",
            "0".repeat(32)
        );

        let lookup = correlator().derive_line(&line).unwrap();
        assert_eq!(lookup.trace_id.to_string(), other);
    }

    #[test]
    fn test_no_trace_id() {
        assert!(correlator().derive_line("User logged in").is_none());
        assert!(correlator().derive_line("trace_id=abc123").is_none());
    }

    #[test]
    fn test_derive_from_record_attributes() {
        let ctx = TraceContext::new_root();
        let record = LogRecord::new(Severity::Info, "Fetched tasks").with_context(&ctx);

        let lookup = correlator().derive(&record).unwrap();
        assert_eq!(lookup.trace_id, ctx.trace_id);
    }

    #[test]
    fn test_searchable_text_sorts_attributes() {
        let record = LogRecord::new(Severity::Info, "done")
            .with_attribute("b", 2_i64)
            .with_attribute("a", "x");
        assert_eq!(searchable_text(&record), "done a=x b=2");
    }

    #[test]
    fn test_pattern_requires_capture_group() {
        assert!(matches!(
            LogToTrace::new("trace_id=[0-9a-f]+"),
            Err(CorrelateError::MissingCaptureGroup(_))
        ));
        assert!(matches!(
            LogToTrace::new("("),
            Err(CorrelateError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_tempo_url() {
        let lookup = correlator()
            .derive_line(&format!("trace_id={TRACE}"))
            .unwrap();
        let url = lookup.url(&Url::parse("http://tempo:3200").unwrap()).unwrap();
        assert_eq!(url.as_str(), format!("http://tempo:3200/api/traces/{TRACE}"));
    }
}
