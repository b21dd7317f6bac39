//! Application state module.
//!
//! Defines the shared application state that is passed to route handlers.

use crate::config::{Config, DEFAULT_MAX_SLOW_DELAY_SECS};
use crate::store::{InMemoryTaskStore, TaskStore};
use shared::emitter::Telemetry;
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Emits this service's traces, metrics and logs.
    telemetry: Telemetry,
    /// Task storage.
    tasks: Arc<dyn TaskStore>,
    /// Upper bound for `/api/simulate-slow`.
    max_slow_delay: Duration,
}

impl AppState {
    /// Creates a new application state with an empty in-memory task store.
    #[must_use]
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            telemetry,
            tasks: Arc::new(InMemoryTaskStore::new()),
            max_slow_delay: Duration::from_secs_f64(DEFAULT_MAX_SLOW_DELAY_SECS),
        }
    }

    /// Creates a new application state from the server configuration.
    #[must_use]
    pub fn from_config(config: &Config, telemetry: Telemetry) -> Self {
        Self::new(telemetry).with_max_slow_delay(Duration::from_secs_f64(config.max_slow_delay_secs))
    }

    /// Replaces the task store.
    #[must_use]
    pub fn with_task_store(mut self, tasks: Arc<dyn TaskStore>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Sets the upper bound for `/api/simulate-slow`.
    #[must_use]
    pub fn with_max_slow_delay(mut self, delay: Duration) -> Self {
        self.max_slow_delay = delay;
        self
    }

    /// Returns the telemetry handle.
    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Returns the task store.
    #[must_use]
    pub fn tasks(&self) -> &dyn TaskStore {
        self.tasks.as_ref()
    }

    /// Returns the slow endpoint's delay bound.
    #[must_use]
    pub fn max_slow_delay(&self) -> Duration {
        self.max_slow_delay
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("telemetry", &self.telemetry)
            .field("max_slow_delay", &self.max_slow_delay)
            .finish_non_exhaustive()
    }
}
