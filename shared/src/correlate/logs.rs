//! Trace -> Logs.

use super::{default_tag_mappings, endpoint, quote, CorrelateError, SpanRef, TagMapping, TimeRange};
use chrono::Duration;
use url::Url;

/// Maximum lines requested from the log backend.
pub const DEFAULT_LIMIT: u32 = 1000;

/// A derived log query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    /// Full LogQL expression.
    pub query: String,
    /// Window to search.
    pub range: TimeRange,
    /// Maximum lines returned.
    pub limit: u32,
}

impl LogQuery {
    /// Loki `query_range` request for this query.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` cannot carry a path.
    pub fn url(&self, base: &Url) -> Result<Url, CorrelateError> {
        let mut url = endpoint(base, &["loki", "api", "v1", "query_range"])?;
        url.query_pairs_mut()
            .append_pair("query", &self.query)
            .append_pair("start", &nanos(self.range.start).to_string())
            .append_pair("end", &nanos(self.range.end).to_string())
            .append_pair("limit", &self.limit.to_string())
            .append_pair("direction", "backward");
        Ok(url)
    }
}

fn nanos(time: chrono::DateTime<chrono::Utc>) -> i64 {
    time.timestamp_nanos_opt()
        .unwrap_or_else(|| time.timestamp().saturating_mul(1_000_000_000))
}

/// Builds log queries from spans.
///
/// The stream selector is made of the mapped tags the span carries. When it
/// carries none, the selector matches every stream that has the first mapped
/// label, so the trace id filter alone narrows the result.
#[derive(Debug, Clone)]
pub struct TraceToLogs {
    mappings: Vec<TagMapping>,
    padding: Duration,
    limit: u32,
}

impl Default for TraceToLogs {
    fn default() -> Self {
        Self {
            mappings: default_tag_mappings(),
            padding: Duration::hours(1),
            limit: DEFAULT_LIMIT,
        }
    }
}

impl TraceToLogs {
    /// Replaces the tag mappings.
    #[must_use]
    pub fn with_mappings(mut self, mappings: Vec<TagMapping>) -> Self {
        self.mappings = mappings;
        self
    }

    /// Sets the padding applied to both ends of the span.
    #[must_use]
    pub fn with_padding(mut self, padding: Duration) -> Self {
        self.padding = padding;
        self
    }

    /// Sets the line limit.
    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Derives the query for `span`.
    ///
    /// The same span always yields the same query.
    #[must_use]
    pub fn derive(&self, span: &SpanRef) -> LogQuery {
        let matchers = span.matchers(&self.mappings);
        let selector = if matchers.is_empty() {
            let label = self
                .mappings
                .first()
                .map_or("service_name", |m| m.label.as_str());
            format!("{{{label}=~\".+\"}}")
        } else {
            format!("{{{}}}", matchers.join(", "))
        };

        LogQuery {
            query: format!("{selector} |= {}", quote(&span.trace_id)),
            range: span.padded_range(self.padding),
            limit: self.limit,
        }
    }
}
