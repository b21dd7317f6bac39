//! The collector's processor chain.
//!
//! Every received batch passes through the same stages, in order:
//!
//! ```text
//! memory guard -> resource tagging -> attribute enrichment -> batching -> export
//! ```
//!
//! Each stage handles the whole batch. The memory guard runs once per request
//! (see [`Pipeline::admit`]); the remaining stages run per signal in
//! [`SignalPipeline::process`].

pub mod batch;
pub mod enrich;
pub mod memory_guard;
pub mod resource_tag;
pub mod retry;

pub use batch::{BatchError, BatchProcessor, ExportTarget};
pub use enrich::{AttributeAction, Enrichable, Enricher};
pub use memory_guard::{AdmissionError, MemoryGuard, MemoryGuardSnapshot, MemoryLease};
pub use resource_tag::ResourceTagger;
pub use retry::{calculate_backoff, export_with_retry};

use crate::export::ExportStatsSnapshot;
use crate::models::{Envelope, LogRecord, MetricPoint, SignalRecord, Span, WireBatch};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// What happened to the records of one received batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Records queued for export.
    pub accepted: usize,
    /// Records refused, either invalid or dropped on a full queue.
    pub rejected: usize,
    /// Description of the first refusal, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Tagging, enrichment and batching for one signal type.
#[derive(Debug)]
pub struct SignalPipeline<T> {
    tagger: ResourceTagger,
    enricher: Enricher,
    batcher: BatchProcessor<T>,
}

impl<T: SignalRecord + Enrichable> SignalPipeline<T> {
    /// Assembles the stages.
    #[must_use]
    pub fn new(tagger: ResourceTagger, enricher: Enricher, batcher: BatchProcessor<T>) -> Self {
        Self {
            tagger,
            enricher,
            batcher,
        }
    }

    /// Runs a received batch through tagging and enrichment, then queues it.
    ///
    /// Invalid records are rejected individually; the rest of the batch is
    /// still accepted. Every queued record holds a clone of `lease`.
    pub fn process(&self, batch: WireBatch<T>, lease: Option<Arc<MemoryLease>>) -> IngestOutcome {
        let resource = self.tagger.tag(Arc::new(batch.resource));
        let mut outcome = IngestOutcome::default();
        let mut envelopes = Vec::with_capacity(batch.records.len());

        for mut record in batch.records {
            if let Err(e) = record.check() {
                outcome.rejected += 1;
                outcome.error_message.get_or_insert(e);
                continue;
            }

            self.enricher.enrich(&mut record, &resource);
            let mut envelope = Envelope::new(Arc::clone(&resource), record);
            envelope.lease.clone_from(&lease);
            envelopes.push(envelope);
        }

        let queued = envelopes.len();
        outcome.accepted = self.batcher.emit_all(envelopes);
        if outcome.accepted < queued {
            outcome.rejected += queued - outcome.accepted;
            outcome
                .error_message
                .get_or_insert_with(|| "Export queue full".to_string());
        }

        debug!(
            signal = %T::SIGNAL,
            service = %resource.service_name,
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            "Processed batch"
        );
        outcome
    }

    /// The batching stage.
    #[must_use]
    pub fn batcher(&self) -> &BatchProcessor<T> {
        &self.batcher
    }
}

/// Export counters for every signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Memory guard counters.
    pub memory: MemoryGuardSnapshot,
    /// Span export counters.
    pub traces: ExportStatsSnapshot,
    /// Metric export counters.
    pub metrics: ExportStatsSnapshot,
    /// Log export counters.
    pub logs: ExportStatsSnapshot,
}

/// The full processor chain for all three signals.
#[derive(Debug)]
pub struct Pipeline {
    guard: Arc<MemoryGuard>,
    /// Span stages.
    pub traces: SignalPipeline<Span>,
    /// Metric stages.
    pub metrics: SignalPipeline<MetricPoint>,
    /// Log stages.
    pub logs: SignalPipeline<LogRecord>,
}

impl Pipeline {
    /// Assembles the chain.
    #[must_use]
    pub fn new(
        guard: Arc<MemoryGuard>,
        traces: SignalPipeline<Span>,
        metrics: SignalPipeline<MetricPoint>,
        logs: SignalPipeline<LogRecord>,
    ) -> Self {
        Self {
            guard,
            traces,
            metrics,
            logs,
        }
    }

    /// Leases memory for a request of `bytes` bytes.
    ///
    /// When the lease lands above the soft limit every batcher is asked to
    /// flush now, so buffered data drains sooner.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError`] if the hard limit would be exceeded.
    pub fn admit(&self, bytes: u64) -> Result<Arc<MemoryLease>, AdmissionError> {
        let lease = self.guard.try_acquire(bytes)?;
        if lease.is_throttled() {
            debug!(bytes, in_use = self.guard.in_use(), "Above soft memory limit, flushing");
            self.traces.batcher.request_flush();
            self.metrics.batcher.request_flush();
            self.logs.batcher.request_flush();
        }
        Ok(Arc::new(lease))
    }

    /// The memory guard.
    #[must_use]
    pub fn guard(&self) -> &Arc<MemoryGuard> {
        &self.guard
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            memory: self.guard.snapshot(),
            traces: self.traces.batcher.stats(),
            metrics: self.metrics.batcher.stats(),
            logs: self.logs.batcher.stats(),
        }
    }

    /// Flushes every signal.
    ///
    /// # Errors
    ///
    /// Returns an error if any batcher has shut down.
    pub async fn force_flush(&self) -> Result<(), BatchError> {
        self.traces.batcher.force_flush().await?;
        self.metrics.batcher.force_flush().await?;
        self.logs.batcher.force_flush().await
    }

    /// Flushes and stops every signal.
    ///
    /// # Errors
    ///
    /// Returns an error if any batcher was already shut down.
    pub async fn shutdown(&self) -> Result<(), BatchError> {
        self.traces.batcher.shutdown().await?;
        self.metrics.batcher.shutdown().await?;
        self.logs.batcher.shutdown().await
    }
}
