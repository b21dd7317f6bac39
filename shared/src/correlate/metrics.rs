//! Trace -> Metrics.
//!
//! Each template is a PromQL expression with a `$__tags` placeholder inside a
//! selector. The placeholder is replaced with the label matchers derived from
//! the span, and the query runs over the span's time range widened by an hour
//! on both sides to cover clock skew and rate windows.

use super::{default_tag_mappings, endpoint, CorrelateError, SpanRef, TagMapping, TimeRange};
use crate::emitter::{HTTP_ERRORS_TOTAL, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};
use chrono::Duration;
use url::Url;

/// Placeholder replaced with label matchers.
pub const TAGS_PLACEHOLDER: &str = "$__tags";

/// A named PromQL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricQueryTemplate {
    /// Display name.
    pub name: String,
    /// PromQL containing [`TAGS_PLACEHOLDER`].
    pub query: String,
}

impl MetricQueryTemplate {
    /// Creates a template.
    #[must_use]
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }

    /// Request rate, error rate and p95 latency of the request metrics.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                "Request rate",
                format!("sum(rate({HTTP_REQUESTS_TOTAL}{{{TAGS_PLACEHOLDER}}}[5m]))"),
            ),
            Self::new(
                "Error rate",
                format!("sum(rate({HTTP_ERRORS_TOTAL}{{{TAGS_PLACEHOLDER}}}[5m]))"),
            ),
            Self::new(
                "p95 latency",
                format!(
                    "histogram_quantile(0.95, sum(rate({HTTP_REQUEST_DURATION_SECONDS}_bucket{{{TAGS_PLACEHOLDER}}}[5m])) by (le))"
                ),
            ),
        ]
    }
}

/// A derived metric query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricQuery {
    /// Template name.
    pub name: String,
    /// PromQL expression.
    pub query: String,
    /// Window to evaluate.
    pub range: TimeRange,
}

impl MetricQuery {
    /// Prometheus `query_range` request for this query.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` cannot carry a path.
    pub fn url(&self, base: &Url, step: Duration) -> Result<Url, CorrelateError> {
        let mut url = endpoint(base, &["api", "v1", "query_range"])?;
        url.query_pairs_mut()
            .append_pair("query", &self.query)
            .append_pair("start", &self.range.start.timestamp().to_string())
            .append_pair("end", &self.range.end.timestamp().to_string())
            .append_pair("step", &format!("{}s", step.num_seconds().max(1)));
        Ok(url)
    }
}

/// Builds metric queries from spans.
#[derive(Debug, Clone)]
pub struct TraceToMetrics {
    mappings: Vec<TagMapping>,
    templates: Vec<MetricQueryTemplate>,
    padding: Duration,
}

impl Default for TraceToMetrics {
    fn default() -> Self {
        Self {
            mappings: default_tag_mappings(),
            templates: MetricQueryTemplate::defaults(),
            padding: Duration::hours(1),
        }
    }
}

impl TraceToMetrics {
    /// Replaces the tag mappings.
    #[must_use]
    pub fn with_mappings(mut self, mappings: Vec<TagMapping>) -> Self {
        self.mappings = mappings;
        self
    }

    /// Replaces the templates.
    #[must_use]
    pub fn with_templates(mut self, templates: Vec<MetricQueryTemplate>) -> Self {
        self.templates = templates;
        self
    }

    /// Sets the padding applied to both ends of the span.
    #[must_use]
    pub fn with_padding(mut self, padding: Duration) -> Self {
        self.padding = padding;
        self
    }

    /// Derives one query per template.
    #[must_use]
    pub fn derive(&self, span: &SpanRef) -> Vec<MetricQuery> {
        let tags = span.matchers(&self.mappings).join(", ");
        let range = span.padded_range(self.padding);

        self.templates
            .iter()
            .map(|template| MetricQuery {
                name: template.name.clone(),
                query: template.query.replace(TAGS_PLACEHOLDER, &tags),
                range,
            })
            .collect()
    }
}
