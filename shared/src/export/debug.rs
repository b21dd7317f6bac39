//! Exporter that writes batches to the process's own `tracing` output.

use super::{ExportError, Exporter};
use crate::models::{SignalRecord, WireBatch};
use async_trait::async_trait;
use tracing::{debug, info};

/// Logs every exported batch as a structured event.
///
/// With `verbose` set, each record is also logged as JSON at debug level.
#[derive(Debug, Clone, Default)]
pub struct DebugExporter {
    verbose: bool,
}

impl DebugExporter {
    /// Creates a debug exporter.
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[async_trait]
impl<T: SignalRecord> Exporter<T> for DebugExporter {
    fn name(&self) -> &str {
        "debug"
    }

    async fn export(&self, batch: &WireBatch<T>) -> Result<(), ExportError> {
        info!(
            signal = %T::SIGNAL,
            service = %batch.resource.service_name,
            records = batch.records.len(),
            "Exported batch"
        );

        if self.verbose {
            for record in &batch.records {
                let json = serde_json::to_string(record)?;
                debug!(signal = %T::SIGNAL, record = %json, "Exported record");
            }
        }
        Ok(())
    }
}
