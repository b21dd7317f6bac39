//! Server configuration module.
//!
//! Handles loading configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use shared::config::{env_or, env_string};
use std::net::SocketAddr;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default upper bound for `/api/simulate-slow`, in seconds.
pub const DEFAULT_MAX_SLOW_DELAY_SECS: f64 = 30.0;

/// Service configuration.
///
/// Configuration values can be set via environment variables:
/// - `SERVICE_HOST`: Host address to bind to (default: "0.0.0.0")
/// - `SERVICE_PORT`: Port to listen on (default: 5000)
/// - `SERVICE_MAX_SLOW_DELAY_SECS`: Longest delay `/api/simulate-slow` honors (default: 30)
///
/// Telemetry export settings are read separately, see
/// [`TelemetryConfig`](shared::emitter::TelemetryConfig).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Longest delay the slow endpoint will sleep for.
    pub max_slow_delay_secs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_slow_delay_secs: DEFAULT_MAX_SLOW_DELAY_SECS,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the resulting
    /// configuration is invalid.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            host: env_string("SERVICE_HOST", &defaults.host),
            port: env_or("SERVICE_PORT", defaults.port)?,
            max_slow_delay_secs: env_or("SERVICE_MAX_SLOW_DELAY_SECS", defaults.max_slow_delay_secs)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the slow delay bound is negative or not finite.
    pub fn validate(&self) -> Result<()> {
        if !self.max_slow_delay_secs.is_finite() || self.max_slow_delay_secs < 0.0 {
            anyhow::bail!(
                "SERVICE_MAX_SLOW_DELAY_SECS must be a non-negative number, got {}",
                self.max_slow_delay_secs
            );
        }
        Ok(())
    }

    /// Returns the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if the host and port do not form a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}
