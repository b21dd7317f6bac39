//! Exporters: where flushed batches go.
//!
//! An [`Exporter`] receives one [`WireBatch`] at a time (one resource, one
//! signal type) and delivers it somewhere. Retries, timeouts and failure
//! accounting live in [`crate::pipeline::retry`], not in the exporters.

pub mod debug;
pub mod http;
pub mod memory;
pub mod stats;

pub use debug::DebugExporter;
pub use http::{loki_push_body, HttpExporter};
pub use memory::InMemoryExporter;
pub use stats::{ExportStats, ExportStatsSnapshot};

use crate::models::WireBatch;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while exporting a batch.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The request could not be sent or the connection failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("Backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
        /// Delay requested by the backend's `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// The batch could not be encoded.
    #[error("Encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// One attempt ran past its deadline.
    #[error("Export timed out after {0:?}")]
    Timeout(Duration),

    /// The exporter was shut down.
    #[error("Exporter is shut down")]
    Shutdown,
}

impl ExportError {
    /// Returns true if trying again may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => matches!(status, 408 | 429 | 502 | 503 | 504),
            Self::Encode(_) | Self::Shutdown => false,
        }
    }

    /// The delay the backend asked for before the next attempt, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// A destination for batches of one record type.
#[async_trait]
pub trait Exporter<T>: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &str;

    /// Delivers one batch.
    async fn export(&self, batch: &WireBatch<T>) -> Result<(), ExportError>;

    /// Releases any resources held by the exporter.
    async fn shutdown(&self) -> Result<(), ExportError> {
        Ok(())
    }
}
