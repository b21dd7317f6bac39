//! Export counters.

use crate::models::Signal;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one signal's export path.
///
/// Every increment is mirrored to the `metrics` facade with a `signal`
/// label, so a process that installs a recorder gets them for free.
#[derive(Debug)]
pub struct ExportStats {
    signal: Signal,
    exported_records: AtomicU64,
    exported_batches: AtomicU64,
    failed_batches: AtomicU64,
    dropped_records: AtomicU64,
    retries: AtomicU64,
}

/// Point-in-time copy of [`ExportStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct ExportStatsSnapshot {
    /// Records delivered.
    pub exported_records: u64,
    /// Batches delivered.
    pub exported_batches: u64,
    /// Batches given up on after the retry bound.
    pub failed_batches: u64,
    /// Records lost to full queues, invalid data or failed batches.
    pub dropped_records: u64,
    /// Attempts after the first.
    pub retries: u64,
}

fn count(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

impl ExportStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            exported_records: AtomicU64::new(0),
            exported_batches: AtomicU64::new(0),
            failed_batches: AtomicU64::new(0),
            dropped_records: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    fn label(&self) -> String {
        self.signal.to_string()
    }

    /// Records a delivered batch.
    pub fn record_exported(&self, records: usize) {
        self.exported_records.fetch_add(count(records), Ordering::Relaxed);
        self.exported_batches.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pillars_exported_records_total", "signal" => self.label())
            .increment(count(records));
    }

    /// Records a batch dropped after exhausting retries.
    pub fn record_failed(&self, records: usize) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pillars_failed_batches_total", "signal" => self.label()).increment(1);
        self.record_dropped(records);
    }

    /// Records records that never reached an exporter.
    ///
    /// Returns the previous drop count, so callers can warn on the first drop.
    pub fn record_dropped(&self, records: usize) -> u64 {
        metrics::counter!("pillars_dropped_records_total", "signal" => self.label())
            .increment(count(records));
        self.dropped_records.fetch_add(count(records), Ordering::Relaxed)
    }

    /// Records one retry.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pillars_export_retries_total", "signal" => self.label()).increment(1);
    }

    /// Returns the current counters.
    #[must_use]
    pub fn snapshot(&self) -> ExportStatsSnapshot {
        ExportStatsSnapshot {
            exported_records: self.exported_records.load(Ordering::Relaxed),
            exported_batches: self.exported_batches.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            dropped_records: self.dropped_records.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}
