//! Admission control for buffered telemetry.
//!
//! The guard tracks how many bytes of received but not yet exported data the
//! collector holds. Every accepted request takes a [`MemoryLease`] for its
//! encoded size; the bytes return to the pool when the lease is dropped,
//! which happens after the last record of that request has been exported or
//! discarded.
//!
//! Two thresholds apply:
//! - above the soft limit (`limit - spike`) data is still accepted, but the
//!   lease is marked throttled so callers can force an early flush;
//! - an admission that would cross the hard limit is refused.

use crate::config::MemoryLimits;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Refusal from the memory guard.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// Accepting the data would exceed the hard limit.
    #[error("Memory limit exceeded: {requested} bytes requested, {in_use} of {limit} in use")]
    OverLimit {
        /// Size of the refused admission.
        requested: u64,
        /// Bytes held at the time of refusal.
        in_use: u64,
        /// The hard limit.
        limit: u64,
    },
}

/// Point-in-time view of the guard's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryGuardSnapshot {
    /// Bytes currently leased.
    pub in_use_bytes: u64,
    /// Hard limit.
    pub limit_bytes: u64,
    /// Soft limit.
    pub soft_limit_bytes: u64,
    /// Admissions accepted.
    pub admitted: u64,
    /// Admissions accepted above the soft limit.
    pub throttled: u64,
    /// Admissions refused.
    pub refused: u64,
}

/// Shared byte counter with hard and soft limits.
#[derive(Debug)]
pub struct MemoryGuard {
    limits: MemoryLimits,
    in_use: AtomicU64,
    admitted: AtomicU64,
    throttled: AtomicU64,
    refused: AtomicU64,
}

impl MemoryGuard {
    /// Creates a guard with nothing leased.
    #[must_use]
    pub fn new(limits: MemoryLimits) -> Arc<Self> {
        Arc::new(Self {
            limits,
            in_use: AtomicU64::new(0),
            admitted: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            refused: AtomicU64::new(0),
        })
    }

    /// Leases `bytes` from the pool.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::OverLimit`] if the lease would push usage
    /// above the hard limit. Nothing is leased in that case.
    pub fn try_acquire(self: &Arc<Self>, bytes: u64) -> Result<MemoryLease, AdmissionError> {
        let limit = self.limits.limit_bytes;
        let previous = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(bytes)
                    .filter(|next| *next <= limit)
            })
            .map_err(|in_use| {
                self.refused.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("pillars_memory_refused_total").increment(1);
                AdmissionError::OverLimit {
                    requested: bytes,
                    in_use,
                    limit,
                }
            })?;

        let now = previous + bytes;
        let throttled = now > self.limits.soft_limit();

        self.admitted.fetch_add(1, Ordering::Relaxed);
        if throttled {
            self.throttled.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("pillars_memory_throttled_total").increment(1);
        }
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("pillars_memory_in_use_bytes").set(now as f64);

        Ok(MemoryLease {
            guard: Arc::clone(self),
            bytes,
            throttled,
        })
    }

    fn release(&self, bytes: u64) {
        let previous = self.in_use.fetch_sub(bytes, Ordering::AcqRel);
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("pillars_memory_in_use_bytes").set(previous.saturating_sub(bytes) as f64);
    }

    /// Bytes currently leased.
    #[must_use]
    pub fn in_use(&self) -> u64 {
        self.in_use.load(Ordering::Acquire)
    }

    /// Returns true if usage is above the soft limit.
    #[must_use]
    pub fn is_above_soft_limit(&self) -> bool {
        self.in_use() > self.limits.soft_limit()
    }

    /// The configured limits.
    #[must_use]
    pub fn limits(&self) -> MemoryLimits {
        self.limits
    }

    /// Returns the current counters.
    #[must_use]
    pub fn snapshot(&self) -> MemoryGuardSnapshot {
        MemoryGuardSnapshot {
            in_use_bytes: self.in_use(),
            limit_bytes: self.limits.limit_bytes,
            soft_limit_bytes: self.limits.soft_limit(),
            admitted: self.admitted.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
        }
    }
}

/// Bytes held on behalf of one accepted request.
///
/// Shared between the request's records as `Arc<MemoryLease>`; the bytes are
/// released when the last clone is dropped.
#[derive(Debug)]
pub struct MemoryLease {
    guard: Arc<MemoryGuard>,
    bytes: u64,
    throttled: bool,
}

impl MemoryLease {
    /// Size of the lease.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Returns true if the lease was granted above the soft limit.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.throttled
    }
}

impl Drop for MemoryLease {
    fn drop(&mut self) {
        self.guard.release(self.bytes);
    }
}
