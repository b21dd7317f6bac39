//! Configuration shared by the emitter and the collector.
//!
//! This module contains batching, retry and memory-limit settings and the
//! environment helpers both binaries load them with.

pub mod pipeline;

pub use pipeline::{env_or, env_string, BatchConfig, ConfigError, MemoryLimits, RetryConfig};
