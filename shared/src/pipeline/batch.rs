//! Size-or-time batching in front of an exporter.
//!
//! Producers hand records to a bounded channel with `try_send` and never
//! wait. One background task owns the buffer and flushes it when it holds
//! `max_export_batch_size` records or when `scheduled_delay` has elapsed since
//! the last flush, whichever comes first. Only that task awaits the network.

use crate::config::{BatchConfig, RetryConfig};
use crate::export::{ExportStats, ExportStatsSnapshot, Exporter};
use crate::models::{group_by_resource, Envelope, SignalRecord};
use crate::pipeline::retry::export_with_retry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Errors returned by flush and shutdown requests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    /// The background task has stopped.
    #[error("Batch processor is shut down")]
    Closed,
}

/// Where a batch processor sends its flushes.
pub struct ExportTarget<T> {
    /// The exporter whose success counts as delivery.
    pub primary: Arc<dyn Exporter<T>>,
    /// Optional second sink that sees every batch; its failures are ignored.
    pub debug: Option<Arc<dyn Exporter<T>>>,
}

impl<T> ExportTarget<T> {
    /// A target with only a primary exporter.
    #[must_use]
    pub fn new(primary: Arc<dyn Exporter<T>>) -> Self {
        Self {
            primary,
            debug: None,
        }
    }

    /// Adds a debug sink.
    #[must_use]
    pub fn with_debug(mut self, debug: Arc<dyn Exporter<T>>) -> Self {
        self.debug = Some(debug);
        self
    }
}

enum BatchMessage<T> {
    Record(Envelope<T>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Buffers records of one signal type and exports them in batches.
pub struct BatchProcessor<T> {
    sender: mpsc::Sender<BatchMessage<T>>,
    flush_hint: Arc<Notify>,
    stats: Arc<ExportStats>,
    warned: AtomicBool,
}

impl<T> std::fmt::Debug for BatchProcessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

impl<T: SignalRecord> BatchProcessor<T> {
    /// Starts the background flush task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(target: ExportTarget<T>, batch: BatchConfig, retry: RetryConfig) -> Self {
        let (sender, receiver) = mpsc::channel(batch.max_queue_size);
        let stats = Arc::new(ExportStats::new(T::SIGNAL));
        let flush_hint = Arc::new(Notify::new());

        let worker = Worker {
            receiver,
            flush_hint: Arc::clone(&flush_hint),
            buffer: Vec::with_capacity(batch.max_export_batch_size),
            target,
            batch,
            retry,
            stats: Arc::clone(&stats),
        };
        tokio::spawn(worker.run());

        Self {
            sender,
            flush_hint,
            stats,
            warned: AtomicBool::new(false),
        }
    }

    /// Queues one record without waiting.
    ///
    /// Returns false if the queue was full or closed; the record is dropped
    /// and counted.
    pub fn emit(&self, envelope: Envelope<T>) -> bool {
        if self.sender.try_send(BatchMessage::Record(envelope)).is_ok() {
            return true;
        }

        self.stats.record_dropped(1);
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!(
                signal = %T::SIGNAL,
                "Export queue full, dropping records. Further drops are counted but not logged"
            );
        }
        false
    }

    /// Queues every record, returning how many were accepted.
    pub fn emit_all(&self, envelopes: impl IntoIterator<Item = Envelope<T>>) -> usize {
        envelopes
            .into_iter()
            .map(|envelope| self.emit(envelope))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Asks the background task to flush soon, without waiting.
    ///
    /// Requests made before the task gets to them collapse into one flush and
    /// never take a slot in the record queue.
    pub fn request_flush(&self) {
        self.flush_hint.notify_one();
    }

    /// Flushes everything queued so far and waits for the export to finish.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Closed`] if the processor has shut down.
    pub async fn force_flush(&self) -> Result<(), BatchError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BatchMessage::Flush(tx))
            .await
            .map_err(|_| BatchError::Closed)?;
        rx.await.map_err(|_| BatchError::Closed)
    }

    /// Flushes, shuts the exporters down and stops the background task.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Closed`] if the processor was already shut down.
    pub async fn shutdown(&self) -> Result<(), BatchError> {
        let dropped = self.stats.snapshot().dropped_records;
        if dropped > 0 {
            warn!(
                signal = %T::SIGNAL,
                dropped,
                "Records were dropped during the lifetime of the processor"
            );
        }

        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BatchMessage::Shutdown(tx))
            .await
            .map_err(|_| BatchError::Closed)?;
        rx.await.map_err(|_| BatchError::Closed)
    }

    /// Export counters for this signal.
    #[must_use]
    pub fn stats(&self) -> ExportStatsSnapshot {
        self.stats.snapshot()
    }
}

struct Worker<T> {
    receiver: mpsc::Receiver<BatchMessage<T>>,
    flush_hint: Arc<Notify>,
    buffer: Vec<Envelope<T>>,
    target: ExportTarget<T>,
    batch: BatchConfig,
    retry: RetryConfig,
    stats: Arc<ExportStats>,
}

impl<T: SignalRecord> Worker<T> {
    async fn run(mut self) {
        let mut deadline = Instant::now() + self.batch.scheduled_delay;
        let flush_hint = Arc::clone(&self.flush_hint);

        loop {
            tokio::select! {
                message = self.receiver.recv() => match message {
                    Some(BatchMessage::Record(envelope)) => {
                        self.buffer.push(envelope);
                        if self.buffer.len() >= self.batch.max_export_batch_size {
                            self.flush().await;
                            deadline = Instant::now() + self.batch.scheduled_delay;
                        }
                    }
                    Some(BatchMessage::Flush(reply)) => {
                        self.flush().await;
                        deadline = Instant::now() + self.batch.scheduled_delay;
                        let _ = reply.send(());
                    }
                    Some(BatchMessage::Shutdown(reply)) => {
                        self.flush().await;
                        self.shutdown_exporters().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.flush().await;
                        self.shutdown_exporters().await;
                        break;
                    }
                },
                () = flush_hint.notified() => {
                    self.flush().await;
                    deadline = Instant::now() + self.batch.scheduled_delay;
                }
                () = sleep_until(deadline) => {
                    self.flush().await;
                    deadline = Instant::now() + self.batch.scheduled_delay;
                }
            }
        }

        debug!(signal = %T::SIGNAL, "Batch processor stopped");
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let envelopes = std::mem::take(&mut self.buffer);
        for batch in group_by_resource(&envelopes) {
            if let Some(debug) = &self.target.debug {
                if let Err(e) = debug.export(&batch).await {
                    debug!(error = %e, "Debug exporter failed");
                }
            }
            let _ = export_with_retry(
                self.target.primary.as_ref(),
                &batch,
                &self.retry,
                &self.stats,
            )
            .await;
        }
        // Leases are released here, after every record was exported or dropped.
        drop(envelopes);
    }

    async fn shutdown_exporters(&self) {
        if let Err(e) = self.target.primary.shutdown().await {
            warn!(signal = %T::SIGNAL, error = %e, "Exporter shutdown failed");
        }
        if let Some(debug) = &self.target.debug {
            let _ = debug.shutdown().await;
        }
    }
}
