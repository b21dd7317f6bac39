//! Pipeline tuning: batching, export retries and memory limits.
//!
//! Every struct here has a `Default` matching the conventional OTLP SDK
//! settings and a `validate()` that rejects values the pipeline cannot run
//! with.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors produced when loading or validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },

    /// A value is out of range.
    #[error("{0}")]
    OutOfRange(String),
}

/// Reads `key` from the environment, falling back to `default` when unset.
///
/// # Errors
///
/// Returns an error if the variable is set but cannot be parsed.
pub fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

/// Reads a string from the environment, falling back to `default`.
#[must_use]
pub fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Batching thresholds for one export buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Capacity of the bounded queue between producers and the flush task.
    pub max_queue_size: usize,
    /// Flush interval.
    pub scheduled_delay: Duration,
    /// Flush as soon as this many records are buffered.
    pub max_export_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            scheduled_delay: Duration::from_millis(5000),
            max_export_batch_size: 512,
        }
    }
}

impl BatchConfig {
    /// Sets the queue capacity.
    #[must_use]
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the flush interval.
    #[must_use]
    pub fn with_scheduled_delay(mut self, delay: Duration) -> Self {
        self.scheduled_delay = delay;
        self
    }

    /// Sets the size threshold.
    #[must_use]
    pub fn with_max_export_batch_size(mut self, size: usize) -> Self {
        self.max_export_batch_size = size;
        self
    }

    /// Validates the batching thresholds.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Any size is zero
    /// - The batch size exceeds the queue size
    /// - The delay is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 || self.max_export_batch_size == 0 {
            return Err(ConfigError::OutOfRange(
                "Queue and batch sizes must be greater than zero".to_string(),
            ));
        }
        if self.max_export_batch_size > self.max_queue_size {
            return Err(ConfigError::OutOfRange(format!(
                "Batch size {} exceeds queue size {}",
                self.max_export_batch_size, self.max_queue_size
            )));
        }
        if self.scheduled_delay.is_zero() {
            return Err(ConfigError::OutOfRange(
                "Scheduled delay must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retry policy for exporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Timeout applied to each attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_millis(30_000),
        }
    }
}

impl RetryConfig {
    /// Sets the attempt bound.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the backoff range.
    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Validates the retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no attempts, the timeout is zero, or the
    /// base delay exceeds the maximum delay.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::OutOfRange(
                "At least one export attempt is required".to_string(),
            ));
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::OutOfRange(
                "Export timeout must be greater than zero".to_string(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigError::OutOfRange(
                "Base backoff cannot exceed maximum backoff".to_string(),
            ));
        }
        Ok(())
    }
}

/// Memory ceiling for data buffered in the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLimits {
    /// Admission that would push usage above this is refused.
    pub limit_bytes: u64,
    /// Headroom below the hard limit where admission is throttled.
    pub spike_bytes: u64,
}

const MIB: u64 = 1024 * 1024;

impl Default for MemoryLimits {
    fn default() -> Self {
        Self::from_mib(512, 128)
    }
}

impl MemoryLimits {
    /// Creates limits from mebibyte values.
    #[must_use]
    pub const fn from_mib(limit_mib: u64, spike_mib: u64) -> Self {
        Self {
            limit_bytes: limit_mib * MIB,
            spike_bytes: spike_mib * MIB,
        }
    }

    /// Usage above which admission is throttled.
    #[must_use]
    pub const fn soft_limit(&self) -> u64 {
        self.limit_bytes.saturating_sub(self.spike_bytes)
    }

    /// Validates the limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the limit is zero or the spike is not below it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit_bytes == 0 {
            return Err(ConfigError::OutOfRange(
                "Memory limit must be greater than zero".to_string(),
            ));
        }
        if self.spike_bytes >= self.limit_bytes {
            return Err(ConfigError::OutOfRange(format!(
                "Spike allowance {} must be below limit {}",
                self.spike_bytes, self.limit_bytes
            )));
        }
        Ok(())
    }
}
