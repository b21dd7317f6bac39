//! Export fan-out wiring.
//!
//! Each signal goes to exactly one primary exporter. Without a configured
//! endpoint the primary is the debug exporter, so a collector with no backends
//! still shows what it receives.

use crate::config::{Config, DebugVerbosity, LogsFormat};
use anyhow::Result;
use shared::export::{DebugExporter, Exporter, HttpExporter, InMemoryExporter};
use shared::models::{LogRecord, MetricPoint, SignalRecord, Span};
use shared::pipeline::{
    BatchProcessor, Enrichable, Enricher, ExportTarget, MemoryGuard, Pipeline, ResourceTagger,
    SignalPipeline,
};
use std::sync::Arc;

/// Primary exporters for the three signals.
#[derive(Clone)]
pub struct Exporters {
    /// Span exporter.
    pub traces: Arc<dyn Exporter<Span>>,
    /// Metric exporter.
    pub metrics: Arc<dyn Exporter<MetricPoint>>,
    /// Log exporter.
    pub logs: Arc<dyn Exporter<LogRecord>>,
}

impl std::fmt::Debug for Exporters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporters")
            .field("traces", &self.traces.name())
            .field("metrics", &self.metrics.name())
            .field("logs", &self.logs.name())
            .finish()
    }
}

/// In-memory exporters, for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct MemoryExporters {
    /// Exported spans.
    pub traces: InMemoryExporter<Span>,
    /// Exported metric points.
    pub metrics: InMemoryExporter<MetricPoint>,
    /// Exported log records.
    pub logs: InMemoryExporter<LogRecord>,
}

impl From<&MemoryExporters> for Exporters {
    fn from(memory: &MemoryExporters) -> Self {
        Self {
            traces: Arc::new(memory.traces.clone()),
            metrics: Arc::new(memory.metrics.clone()),
            logs: Arc::new(memory.logs.clone()),
        }
    }
}

impl Exporters {
    /// Builds HTTP exporters for every configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.retry.attempt_timeout;

        let traces: Arc<dyn Exporter<Span>> = match &config.traces_endpoint {
            Some(url) => Arc::new(HttpExporter::<Span>::json(url.clone(), timeout)?),
            None => fallback(config.debug),
        };
        let metrics: Arc<dyn Exporter<MetricPoint>> = match &config.metrics_endpoint {
            Some(url) => Arc::new(HttpExporter::<MetricPoint>::json(url.clone(), timeout)?),
            None => fallback(config.debug),
        };
        let logs: Arc<dyn Exporter<LogRecord>> = match (&config.logs_endpoint, config.logs_format) {
            (Some(url), LogsFormat::Loki) => Arc::new(HttpExporter::loki(url.clone(), timeout)?),
            (Some(url), LogsFormat::Json) => {
                Arc::new(HttpExporter::<LogRecord>::json(url.clone(), timeout)?)
            }
            (None, _) => fallback(config.debug),
        };

        Ok(Self {
            traces,
            metrics,
            logs,
        })
    }
}

fn fallback<T: SignalRecord>(verbosity: DebugVerbosity) -> Arc<dyn Exporter<T>> {
    Arc::new(DebugExporter::new(verbosity == DebugVerbosity::Detailed))
}

fn debug_sink<T: SignalRecord>(config: &Config) -> Option<Arc<dyn Exporter<T>>> {
    match config.debug {
        DebugVerbosity::None => None,
        verbosity => Some(fallback(verbosity)),
    }
}

fn signal<T: SignalRecord + Enrichable>(
    config: &Config,
    primary: Arc<dyn Exporter<T>>,
) -> SignalPipeline<T> {
    // A debug primary already prints every batch.
    let mut target = ExportTarget::new(primary);
    if target.primary.name() != "debug" {
        if let Some(debug) = debug_sink(config) {
            target = target.with_debug(debug);
        }
    }

    let tagger = config
        .resource_attributes
        .iter()
        .fold(ResourceTagger::new(config.instance_id.clone()), |tagger, (key, value)| {
            tagger.with_attribute(key.clone(), value.as_str())
        });

    SignalPipeline::new(
        tagger,
        Enricher::new(
            config.attribute_actions.clone(),
            config.promoted_labels.clone(),
        ),
        BatchProcessor::new(target, config.batch, config.retry),
    )
}

/// Assembles the processor chain. Must be called inside a Tokio runtime.
#[must_use]
pub fn build_pipeline(config: &Config, exporters: Exporters) -> Pipeline {
    Pipeline::new(
        MemoryGuard::new(config.memory),
        signal(config, exporters.traces),
        signal(config, exporters.metrics),
        signal(config, exporters.logs),
    )
}
