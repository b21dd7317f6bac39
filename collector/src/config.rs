//! Server configuration module.
//!
//! Handles loading configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use shared::config::{env_or, env_string, BatchConfig, MemoryLimits, RetryConfig};
use shared::pipeline::enrich::DEFAULT_PROMOTED_LABELS;
use shared::pipeline::AttributeAction;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Default OTLP/HTTP port.
pub const DEFAULT_PORT: u16 = 4318;

/// Default maximum request body size (4 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// How log batches are encoded for the log backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogsFormat {
    /// Loki push API streams.
    #[default]
    Loki,
    /// Generic JSON wire batches.
    Json,
}

impl fmt::Display for LogsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loki => write!(f, "loki"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogsFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "loki" => Ok(Self::Loki),
            "json" => Ok(Self::Json),
            other => Err(format!("Unknown logs format: {other}")),
        }
    }
}

/// How much the debug exporter prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugVerbosity {
    /// No debug exporter.
    #[default]
    None,
    /// One event per batch.
    Basic,
    /// One event per batch plus one per record.
    Detailed,
}

impl fmt::Display for DebugVerbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Basic => write!(f, "basic"),
            Self::Detailed => write!(f, "detailed"),
        }
    }
}

impl FromStr for DebugVerbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" | "" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "detailed" => Ok(Self::Detailed),
            other => Err(format!("Unknown debug verbosity: {other}")),
        }
    }
}

/// Collector configuration.
///
/// Configuration values can be set via environment variables:
/// - `PILLARS_HOST`: The host address to bind to (default: "0.0.0.0")
/// - `PILLARS_PORT`: The port to listen on (default: 4318)
/// - `PILLARS_INSTANCE_ID`: Value stamped as `service.instance.id` (default: `HOSTNAME` or "pillars-collector")
/// - `PILLARS_MEMORY_LIMIT_MIB` / `PILLARS_MEMORY_SPIKE_MIB`: Memory guard limits (default: 512 / 128)
/// - `PILLARS_BATCH_SIZE`: Records per export (default: 1024)
/// - `PILLARS_BATCH_TIMEOUT_MS`: Maximum time a record waits in a batch (default: 1000)
/// - `PILLARS_QUEUE_SIZE`: Records buffered per signal before dropping (default: 4096)
/// - `PILLARS_RETRY_MAX_ATTEMPTS`: Export attempts per batch (default: 5)
/// - `PILLARS_RETRY_INITIAL_BACKOFF_MS` / `PILLARS_RETRY_MAX_BACKOFF_MS`: Backoff bounds (default: 100 / 5000)
/// - `PILLARS_EXPORT_TIMEOUT_MS`: Timeout of one export attempt (default: 10000)
/// - `PILLARS_TRACES_ENDPOINT`, `PILLARS_METRICS_ENDPOINT`, `PILLARS_LOGS_ENDPOINT`: Backend URLs (unset: debug output only)
/// - `PILLARS_LOGS_FORMAT`: `loki` or `json` (default: "loki")
/// - `PILLARS_DEBUG_VERBOSITY`: `none`, `basic` or `detailed` (default: "none")
/// - `PILLARS_RESOURCE_ATTRIBUTES`: Extra resource attributes to stamp, such as `k8s.cluster.name=lab,region=eu`
/// - `PILLARS_PROMOTED_LABELS`: Comma-separated resource attributes promoted to labels
/// - `PILLARS_ATTRIBUTE_ACTIONS`: Comma-separated actions such as `insert:env=lab,delete:secret`
/// - `PILLARS_MAX_BODY_BYTES`: Request body limit (default: 4194304)
#[derive(Debug, Clone)]
pub struct Config {
    /// The host address to bind to.
    pub host: String,
    /// The port to listen on.
    pub port: u16,
    /// Identity of this collector instance.
    pub instance_id: String,
    /// Extra resource attributes stamped next to the instance id.
    pub resource_attributes: Vec<(String, String)>,
    /// Memory guard limits.
    pub memory: MemoryLimits,
    /// Batching thresholds, per signal.
    pub batch: BatchConfig,
    /// Export retry policy.
    pub retry: RetryConfig,
    /// Trace backend.
    pub traces_endpoint: Option<Url>,
    /// Metric backend.
    pub metrics_endpoint: Option<Url>,
    /// Log backend.
    pub logs_endpoint: Option<Url>,
    /// Log backend encoding.
    pub logs_format: LogsFormat,
    /// Debug exporter setting.
    pub debug: DebugVerbosity,
    /// Resource attributes promoted to indexed labels.
    pub promoted_labels: Vec<String>,
    /// Attribute edits applied to every record.
    pub attribute_actions: Vec<AttributeAction>,
    /// Request body limit in bytes.
    pub max_body_bytes: usize,
}

impl Config {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - a numeric variable cannot be parsed
    /// - an endpoint is not a valid URL
    /// - an attribute action, logs format or verbosity is malformed
    /// - the resulting limits are inconsistent
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let memory = MemoryLimits::from_mib(
            env_or("PILLARS_MEMORY_LIMIT_MIB", 512_u64)?,
            env_or("PILLARS_MEMORY_SPIKE_MIB", 128_u64)?,
        );

        let batch = BatchConfig::default()
            .with_max_queue_size(env_or("PILLARS_QUEUE_SIZE", defaults.batch.max_queue_size)?)
            .with_max_export_batch_size(env_or(
                "PILLARS_BATCH_SIZE",
                defaults.batch.max_export_batch_size,
            )?)
            .with_scheduled_delay(Duration::from_millis(env_or(
                "PILLARS_BATCH_TIMEOUT_MS",
                1000_u64,
            )?));

        let retry = RetryConfig::default()
            .with_max_attempts(env_or("PILLARS_RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?)
            .with_backoff(
                Duration::from_millis(env_or("PILLARS_RETRY_INITIAL_BACKOFF_MS", 100_u64)?),
                Duration::from_millis(env_or("PILLARS_RETRY_MAX_BACKOFF_MS", 5000_u64)?),
            )
            .with_attempt_timeout(Duration::from_millis(env_or(
                "PILLARS_EXPORT_TIMEOUT_MS",
                10_000_u64,
            )?));

        let config = Self {
            host: env_string("PILLARS_HOST", &defaults.host),
            port: env_or("PILLARS_PORT", DEFAULT_PORT)?,
            instance_id: std::env::var("PILLARS_INSTANCE_ID")
                .or_else(|_| std::env::var("HOSTNAME"))
                .unwrap_or(defaults.instance_id),
            resource_attributes: std::env::var("PILLARS_RESOURCE_ATTRIBUTES")
                .map_or_else(|_| Ok(Vec::new()), |v| parse_pairs(&v))?,
            memory,
            batch,
            retry,
            traces_endpoint: optional_url("PILLARS_TRACES_ENDPOINT")?,
            metrics_endpoint: optional_url("PILLARS_METRICS_ENDPOINT")?,
            logs_endpoint: optional_url("PILLARS_LOGS_ENDPOINT")?,
            logs_format: env_string("PILLARS_LOGS_FORMAT", "loki")
                .parse::<LogsFormat>()
                .map_err(anyhow::Error::msg)?,
            debug: env_string("PILLARS_DEBUG_VERBOSITY", "none")
                .parse::<DebugVerbosity>()
                .map_err(anyhow::Error::msg)?,
            promoted_labels: std::env::var("PILLARS_PROMOTED_LABELS")
                .map_or(defaults.promoted_labels, |v| split_list(&v).map(String::from).collect()),
            attribute_actions: std::env::var("PILLARS_ATTRIBUTE_ACTIONS")
                .map_or_else(|_| Ok(Vec::new()), |v| parse_actions(&v))?,
            max_body_bytes: env_or("PILLARS_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks that the limits are consistent.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory, batch or retry settings are invalid.
    pub fn validate(&self) -> Result<()> {
        self.memory.validate()?;
        self.batch.validate()?;
        self.retry.validate()?;
        Ok(())
    }

    /// Returns the socket address for binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the host and port combination cannot be parsed as a
    /// valid socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid socket address {}:{}", self.host, self.port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            instance_id: "pillars-collector".to_string(),
            resource_attributes: Vec::new(),
            memory: MemoryLimits::default(),
            batch: BatchConfig::default()
                .with_max_queue_size(4096)
                .with_max_export_batch_size(1024)
                .with_scheduled_delay(Duration::from_secs(1)),
            retry: RetryConfig::default().with_attempt_timeout(Duration::from_secs(10)),
            traces_endpoint: None,
            metrics_endpoint: None,
            logs_endpoint: None,
            logs_format: LogsFormat::default(),
            debug: DebugVerbosity::default(),
            promoted_labels: DEFAULT_PROMOTED_LABELS
                .iter()
                .map(ToString::to_string)
                .collect(),
            attribute_actions: Vec::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

fn optional_url(key: &str) -> Result<Option<Url>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            let url = Url::parse(value.trim()).with_context(|| format!("{key} is not a URL"))?;
            Ok(Some(url))
        }
        _ => Ok(None),
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_pairs(value: &str) -> Result<Vec<(String, String)>> {
    split_list(value)
        .map(|raw| {
            raw.split_once('=')
                .filter(|(key, _)| !key.trim().is_empty())
                .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
                .with_context(|| format!("Invalid resource attribute: {raw}"))
        })
        .collect()
}

fn parse_actions(value: &str) -> Result<Vec<AttributeAction>> {
    split_list(value)
        .map(|raw| {
            raw.parse::<AttributeAction>()
                .with_context(|| format!("Invalid attribute action: {raw}"))
        })
        .collect()
}
