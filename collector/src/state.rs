//! Application state module.
//!
//! Defines the shared application state that is passed to route handlers.

use crate::config::{Config, DEFAULT_MAX_BODY_BYTES};
use crate::exporters::{build_pipeline, Exporters, MemoryExporters};
use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use shared::pipeline::Pipeline;
use std::sync::Arc;

/// Application state shared across all request handlers.
///
/// Holds the processor chain and, when the process installed one, the handle
/// that renders the collector's own Prometheus metrics.
#[derive(Clone)]
pub struct AppState {
    /// The processor chain.
    pipeline: Arc<Pipeline>,
    /// Renders `/metrics`.
    prometheus: Option<PrometheusHandle>,
    /// Request body limit in bytes.
    max_body_bytes: usize,
}

impl AppState {
    /// Creates a new application state around a pipeline.
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            prometheus: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Builds the pipeline and exporters described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an exporter cannot be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        let exporters = Exporters::from_config(config)?;
        Ok(Self::new(build_pipeline(config, exporters)).with_max_body_bytes(config.max_body_bytes))
    }

    /// Creates a new application state that exports into memory.
    ///
    /// This is useful for development and testing.
    #[must_use]
    pub fn with_in_memory_exporters(config: &Config) -> (Self, MemoryExporters) {
        let exporters = MemoryExporters::default();
        let state = Self::new(build_pipeline(config, Exporters::from(&exporters)))
            .with_max_body_bytes(config.max_body_bytes);
        (state, exporters)
    }

    /// Attaches the Prometheus handle served on `/metrics`.
    #[must_use]
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Sets the request body limit.
    #[must_use]
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Returns the request body limit.
    #[must_use]
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Returns a reference to the pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns the Prometheus handle, if any.
    #[must_use]
    pub fn prometheus(&self) -> Option<&PrometheusHandle> {
        self.prometheus.as_ref()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("pipeline", &self.pipeline)
            .field("prometheus", &self.prometheus.is_some())
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}
