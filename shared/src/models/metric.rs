//! Metric data model.
//!
//! Defines the `MetricPoint` structure: one observation of one metric.

use super::attributes::Labels;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Default histogram bucket boundaries, in seconds.
pub const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// A monotonic, non-negative increment (e.g., request count).
    Counter,
    /// A last-value-wins reading (e.g., memory usage).
    #[default]
    Gauge,
    /// A distribution recorded against bucket boundaries (e.g., latency).
    Histogram,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Gauge => write!(f, "gauge"),
            Self::Histogram => write!(f, "histogram"),
        }
    }
}

/// A histogram bucket for distribution metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// The inclusive upper bound of this bucket.
    pub upper_bound: f64,
    /// The cumulative count of observations at or below the bound.
    pub count: u64,
}

/// Histogram data for distribution metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramData {
    /// The histogram buckets.
    pub buckets: Vec<HistogramBucket>,
    /// The sum of all observed values.
    pub sum: f64,
    /// The total count of observations.
    pub count: u64,
}

impl HistogramData {
    /// Builds cumulative histogram data for a single observation.
    #[must_use]
    pub fn from_observation(value: f64, bounds: &[f64]) -> Self {
        let buckets = bounds
            .iter()
            .map(|&upper_bound| HistogramBucket {
                upper_bound,
                count: u64::from(value <= upper_bound),
            })
            .collect();

        Self {
            buckets,
            sum: value,
            count: 1,
        }
    }
}

/// The value of a metric point, which varies by metric kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// A simple numeric value (for counters and gauges).
    Simple(f64),
    /// Histogram data for distribution metrics.
    Histogram(HistogramData),
}

impl MetricValue {
    /// Returns the simple value if this is a simple metric.
    #[must_use]
    pub fn as_simple(&self) -> Option<f64> {
        match self {
            Self::Simple(v) => Some(*v),
            Self::Histogram(_) => None,
        }
    }

    /// Returns the histogram data if this is a histogram metric.
    #[must_use]
    pub fn as_histogram(&self) -> Option<&HistogramData> {
        match self {
            Self::Simple(_) => None,
            Self::Histogram(h) => Some(h),
        }
    }
}

/// A single metric observation.
///
/// The number of distinct label sets per metric name should stay small;
/// high-cardinality labels such as trace IDs degrade the metrics backend.
///
/// # Example
///
/// ```
/// use shared::models::MetricPoint;
///
/// let point = MetricPoint::counter("http_requests_total", 1.0)
///     .with_label("method", "GET")
///     .with_label("status_code", "200");
///
/// assert!(point.validate_point().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct MetricPoint {
    /// The name of the metric (e.g., "`http_requests_total`").
    #[validate(length(min = 1, message = "Metric name cannot be empty"))]
    pub name: String,

    /// The kind of metric.
    pub kind: MetricKind,

    /// The observed value.
    pub value: MetricValue,

    /// Labels (dimensions) for the metric.
    #[serde(default)]
    pub labels: Labels,

    /// Timestamp when the observation was made.
    pub timestamp: DateTime<Utc>,

    /// Optional description of the metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Optional unit of the metric (e.g., "bytes", "s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Errors that can occur during metric validation.
#[derive(Debug, Error)]
pub enum MetricValidationError {
    /// The metric name is empty.
    #[error("Metric name cannot be empty")]
    EmptyName,

    /// The metric name does not follow the naming grammar.
    #[error("Invalid metric name: '{0}'")]
    InvalidName(String),

    /// Invalid label name.
    #[error("Invalid label name: '{0}'")]
    InvalidLabelName(String),

    /// The value is NaN or infinite.
    #[error("Metric value must be finite")]
    NonFiniteValue,

    /// A counter was given a negative increment.
    #[error("Counter increments cannot be negative: {0}")]
    NegativeCounter(f64),

    /// The value shape does not match the metric kind.
    #[error("Value does not match metric kind '{0}'")]
    KindMismatch(MetricKind),

    /// Histogram has invalid buckets.
    #[error("Histogram buckets must be sorted in ascending order")]
    InvalidHistogramBuckets,

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl MetricPoint {
    /// Creates a new metric point with the current timestamp.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: MetricKind, value: MetricValue) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
            labels: Labels::new(),
            timestamp: Utc::now(),
            description: None,
            unit: None,
        }
    }

    /// Creates a counter increment.
    #[must_use]
    pub fn counter(name: impl Into<String>, increment: f64) -> Self {
        Self::new(name, MetricKind::Counter, MetricValue::Simple(increment))
    }

    /// Creates a gauge reading.
    #[must_use]
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricKind::Gauge, MetricValue::Simple(value))
    }

    /// Creates a histogram observation against the given bucket boundaries.
    #[must_use]
    pub fn histogram(name: impl Into<String>, value: f64, bounds: &[f64]) -> Self {
        Self::new(
            name,
            MetricKind::Histogram,
            MetricValue::Histogram(HistogramData::from_observation(value, bounds)),
        )
    }

    /// Adds a label to the metric point.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Replaces all labels.
    #[must_use]
    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    /// Sets the description of the metric.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the unit of the metric.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Sets the timestamp of the metric point.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Validates the metric point.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The name is empty or malformed
    /// - A label name is malformed
    /// - The value is not finite, or a counter increment is negative
    /// - The value shape does not match the kind
    /// - Histogram buckets are not sorted
    pub fn validate_point(&self) -> Result<(), MetricValidationError> {
        if self.name.is_empty() {
            return Err(MetricValidationError::EmptyName);
        }
        if !is_valid_metric_name(&self.name) {
            return Err(MetricValidationError::InvalidName(self.name.clone()));
        }
        if let Some(bad) = self.labels.keys().find(|k| !is_valid_label_name(k)) {
            return Err(MetricValidationError::InvalidLabelName(bad.clone()));
        }

        match (&self.value, self.kind) {
            (MetricValue::Simple(v), MetricKind::Counter | MetricKind::Gauge) => {
                if !v.is_finite() {
                    return Err(MetricValidationError::NonFiniteValue);
                }
                if self.kind == MetricKind::Counter && *v < 0.0 {
                    return Err(MetricValidationError::NegativeCounter(*v));
                }
            }
            (MetricValue::Histogram(hist), MetricKind::Histogram) => {
                if !hist.sum.is_finite() {
                    return Err(MetricValidationError::NonFiniteValue);
                }
                for pair in hist.buckets.windows(2) {
                    if pair[1].upper_bound <= pair[0].upper_bound {
                        return Err(MetricValidationError::InvalidHistogramBuckets);
                    }
                }
            }
            (_, kind) => return Err(MetricValidationError::KindMismatch(kind)),
        }

        self.validate()?;
        Ok(())
    }

    /// Returns the simple value if this point has one.
    #[must_use]
    pub fn simple_value(&self) -> Option<f64> {
        self.value.as_simple()
    }
}
