//! Emitter configuration.

use crate::config::{env_or, env_string, BatchConfig, ConfigError, RetryConfig};
use crate::models::{Resource, Signal};
use std::time::Duration;
use url::Url;

/// Default service name.
pub const DEFAULT_SERVICE_NAME: &str = "flask-backend";
/// Default service version.
pub const DEFAULT_SERVICE_VERSION: &str = "1.0.0";
/// Default deployment environment.
pub const DEFAULT_ENVIRONMENT: &str = "lab";
/// Default collector base URL.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4318";

/// Everything needed to build a [`Telemetry`](super::Telemetry) that exports
/// over HTTP.
///
/// Configuration values can be set via environment variables:
/// - `OTEL_SERVICE_NAME` (default: "flask-backend")
/// - `OTEL_SERVICE_VERSION` (default: "1.0.0")
/// - `OTEL_DEPLOYMENT_ENVIRONMENT` (default: "lab")
/// - `OTEL_EXPORTER_OTLP_ENDPOINT` (default: "<http://localhost:4318>")
/// - `OTEL_BSP_MAX_QUEUE_SIZE` (default: 2048)
/// - `OTEL_BSP_SCHEDULE_DELAY` in milliseconds (default: 5000)
/// - `OTEL_BSP_MAX_EXPORT_BATCH_SIZE` (default: 512)
/// - `OTEL_BSP_EXPORT_TIMEOUT` in milliseconds (default: 30000)
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// Identity of this process.
    pub resource: Resource,
    /// Collector base URL; `/v1/<signal>` is appended per signal.
    pub endpoint: String,
    /// Batching thresholds, shared by the three buffers.
    pub batch: BatchConfig,
    /// Export retry policy.
    pub retry: RetryConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            resource: Resource::new(DEFAULT_SERVICE_NAME)
                .with_version(DEFAULT_SERVICE_VERSION)
                .with_environment(DEFAULT_ENVIRONMENT),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            batch: BatchConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl TelemetryConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let resource = Resource::new(env_string("OTEL_SERVICE_NAME", DEFAULT_SERVICE_NAME))
            .with_version(env_string("OTEL_SERVICE_VERSION", DEFAULT_SERVICE_VERSION))
            .with_environment(env_string("OTEL_DEPLOYMENT_ENVIRONMENT", DEFAULT_ENVIRONMENT));

        let defaults = BatchConfig::default();
        let batch = BatchConfig {
            max_queue_size: env_or("OTEL_BSP_MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            scheduled_delay: Duration::from_millis(env_or("OTEL_BSP_SCHEDULE_DELAY", 5000_u64)?),
            max_export_batch_size: env_or(
                "OTEL_BSP_MAX_EXPORT_BATCH_SIZE",
                defaults.max_export_batch_size,
            )?,
        };

        let retry = RetryConfig::default().with_attempt_timeout(Duration::from_millis(env_or(
            "OTEL_BSP_EXPORT_TIMEOUT",
            30_000_u64,
        )?));

        let config = Self {
            resource,
            endpoint: env_string("OTEL_EXPORTER_OTLP_ENDPOINT", DEFAULT_ENDPOINT),
            batch,
            retry,
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the collector base URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the resource.
    #[must_use]
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = resource;
        self
    }

    /// URL that receives `signal`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not a valid URL.
    pub fn signal_endpoint(&self, signal: Signal) -> Result<Url, ConfigError> {
        let raw = format!("{}{}", self.endpoint.trim_end_matches('/'), signal.path());
        Url::parse(&raw).map_err(|_| ConfigError::InvalidValue {
            key: "OTEL_EXPORTER_OTLP_ENDPOINT".to_string(),
            value: self.endpoint.clone(),
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the service name is empty, the endpoint is not a
    /// URL, or the batching or retry settings are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resource.service_name.is_empty() {
            return Err(ConfigError::OutOfRange(
                "Service name cannot be empty".to_string(),
            ));
        }
        self.signal_endpoint(Signal::Traces)?;
        self.batch.validate()?;
        self.retry.validate()
    }
}
