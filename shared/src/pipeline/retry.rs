//! Bounded export retries with exponential backoff and jitter.

use crate::config::RetryConfig;
use crate::export::{ExportError, ExportStats, Exporter};
use crate::models::WireBatch;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay before retry number `attempt` (1-based); zero for attempt 0.
///
/// Doubles from `base` up to `max`, plus up to 10% jitter.
#[must_use]
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);

    let exponential = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(exponential).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

/// Exports one batch, retrying transient failures.
///
/// Each attempt runs under `config.attempt_timeout`. Permanent errors stop
/// immediately. A backend's `Retry-After` hint replaces the computed backoff,
/// capped at `config.max_delay`. When the attempt bound is reached the batch is counted as
/// failed and its records as dropped.
///
/// # Errors
///
/// Returns the last error if the batch could not be delivered.
pub async fn export_with_retry<T>(
    exporter: &dyn Exporter<T>,
    batch: &WireBatch<T>,
    config: &RetryConfig,
    stats: &ExportStats,
) -> Result<(), ExportError> {
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(config.attempt_timeout, exporter.export(batch)).await
        {
            Ok(result) => result,
            Err(_) => Err(ExportError::Timeout(config.attempt_timeout)),
        };

        let err = match result {
            Ok(()) => {
                stats.record_exported(batch.records.len());
                return Ok(());
            }
            Err(err) => err,
        };

        attempt += 1;
        if !err.is_retryable() || attempt >= config.max_attempts {
            warn!(
                exporter = exporter.name(),
                attempts = attempt,
                records = batch.records.len(),
                error = %err,
                "Dropping batch after failed export"
            );
            stats.record_failed(batch.records.len());
            return Err(err);
        }

        let delay = match err.retry_after() {
            Some(hint) => hint.min(config.max_delay),
            None => calculate_backoff(attempt, config.base_delay, config.max_delay),
        };
        debug!(
            exporter = exporter.name(),
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "Retrying export"
        );
        stats.record_retry();
        tokio::time::sleep(delay).await;
    }
}
