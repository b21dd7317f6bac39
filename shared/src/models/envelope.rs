//! Records in transit.
//!
//! An [`Envelope`] pairs one record with the resource that produced it and,
//! inside the collector, the memory lease that pays for it. On export,
//! consecutive envelopes with the same resource are regrouped into a
//! [`WireBatch`].

use super::log::LogRecord;
use super::metric::MetricPoint;
use super::resource::Resource;
use super::trace::Span;
use crate::pipeline::memory_guard::MemoryLease;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The three telemetry signal types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Spans.
    Traces,
    /// Metric points.
    Metrics,
    /// Log records.
    Logs,
}

impl Signal {
    /// All signal types.
    pub const ALL: [Self; 3] = [Self::Traces, Self::Metrics, Self::Logs];

    /// HTTP path that receives this signal.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Traces => "/v1/traces",
            Self::Metrics => "/v1/metrics",
            Self::Logs => "/v1/logs",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Traces => write!(f, "traces"),
            Self::Metrics => write!(f, "metrics"),
            Self::Logs => write!(f, "logs"),
        }
    }
}

/// A record type that travels through the pipeline.
pub trait SignalRecord: Clone + Send + Sync + Serialize + 'static {
    /// The signal this record belongs to.
    const SIGNAL: Signal;

    /// Checks the record's own invariants.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    fn check(&self) -> Result<(), String>;
}

impl SignalRecord for Span {
    const SIGNAL: Signal = Signal::Traces;

    fn check(&self) -> Result<(), String> {
        self.validate_span().map_err(|e| e.to_string())
    }
}

impl SignalRecord for MetricPoint {
    const SIGNAL: Signal = Signal::Metrics;

    fn check(&self) -> Result<(), String> {
        self.validate_point().map_err(|e| e.to_string())
    }
}

impl SignalRecord for LogRecord {
    const SIGNAL: Signal = Signal::Logs;

    fn check(&self) -> Result<(), String> {
        self.validate_record().map_err(|e| e.to_string())
    }
}

/// One record plus the resource that produced it.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    /// Identity of the producing service.
    pub resource: Arc<Resource>,
    /// The record itself.
    pub record: T,
    /// Memory held on behalf of this record; released when the last
    /// envelope of the same request is dropped.
    pub lease: Option<Arc<MemoryLease>>,
}

impl<T> Envelope<T> {
    /// Wraps a record without a memory lease.
    #[must_use]
    pub fn new(resource: Arc<Resource>, record: T) -> Self {
        Self {
            resource,
            record,
            lease: None,
        }
    }

    /// Attaches a memory lease.
    #[must_use]
    pub fn with_lease(mut self, lease: Arc<MemoryLease>) -> Self {
        self.lease = Some(lease);
        self
    }
}

/// JSON body of one export call: a resource and its records, one signal
/// type per batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireBatch<T> {
    /// Identity shared by every record in the batch.
    pub resource: Resource,
    /// The records.
    #[serde(default = "Vec::new")]
    pub records: Vec<T>,
}

impl<T> WireBatch<T> {
    /// Creates a batch.
    #[must_use]
    pub fn new(resource: Resource, records: Vec<T>) -> Self {
        Self { resource, records }
    }

    /// Splits the batch into envelopes sharing one resource.
    #[must_use]
    pub fn into_envelopes(self) -> Vec<Envelope<T>> {
        let resource = Arc::new(self.resource);
        self.records
            .into_iter()
            .map(|record| Envelope::new(Arc::clone(&resource), record))
            .collect()
    }
}

/// Regroups consecutive envelopes with the same resource into wire batches.
///
/// Order is preserved: records appear in the output in the order they were
/// received. Leases stay with the input envelopes.
#[must_use]
pub fn group_by_resource<T: Clone>(envelopes: &[Envelope<T>]) -> Vec<WireBatch<T>> {
    let mut batches: Vec<(Arc<Resource>, Vec<T>)> = Vec::new();

    for envelope in envelopes {
        match batches.last_mut() {
            Some((resource, records))
                if Arc::ptr_eq(resource, &envelope.resource)
                    || **resource == *envelope.resource =>
            {
                records.push(envelope.record.clone());
            }
            _ => batches.push((
                Arc::clone(&envelope.resource),
                vec![envelope.record.clone()],
            )),
        }
    }

    batches
        .into_iter()
        .map(|(resource, records)| WireBatch::new((*resource).clone(), records))
        .collect()
}
