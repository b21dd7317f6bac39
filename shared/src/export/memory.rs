//! Exporter that keeps batches in memory.
//!
//! Used by tests and by embedders that want to inspect what the pipeline
//! produced.

use super::{ExportError, Exporter};
use crate::models::WireBatch;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Collects exported batches.
///
/// Clones share the same storage.
#[derive(Debug)]
pub struct InMemoryExporter<T> {
    batches: Arc<Mutex<Vec<WireBatch<T>>>>,
    failures: Arc<AtomicUsize>,
}

impl<T> Clone for InMemoryExporter<T> {
    fn clone(&self) -> Self {
        Self {
            batches: Arc::clone(&self.batches),
            failures: Arc::clone(&self.failures),
        }
    }
}

impl<T> Default for InMemoryExporter<T> {
    fn default() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<T: Clone> InMemoryExporter<T> {
    /// Creates an empty exporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` export calls fail with a retryable error.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Returns every batch exported so far.
    #[must_use]
    pub fn batches(&self) -> Vec<WireBatch<T>> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    /// Returns every record exported so far, in export order.
    #[must_use]
    pub fn records(&self) -> Vec<T> {
        self.batches()
            .into_iter()
            .flat_map(|b| b.records)
            .collect()
    }

    /// Number of successful export calls.
    #[must_use]
    pub fn export_count(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or_default()
    }

    /// Discards everything collected so far.
    pub fn reset(&self) {
        if let Ok(mut batches) = self.batches.lock() {
            batches.clear();
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> Exporter<T> for InMemoryExporter<T> {
    fn name(&self) -> &str {
        "memory"
    }

    async fn export(&self, batch: &WireBatch<T>) -> Result<(), ExportError> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ExportError::Transport("injected failure".to_string()));
        }

        self.batches
            .lock()
            .map_err(|_| ExportError::Shutdown)?
            .push(batch.clone());
        Ok(())
    }
}
