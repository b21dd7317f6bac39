//! API route definitions.
//!
//! This module organizes all HTTP routes for the Pillars collector.

mod health;
mod ingest;
mod metrics;
mod stats;

pub use health::health_routes;
pub use ingest::{ingest_routes, ExportResponse, PartialSuccess, Routed, RETRY_AFTER_SECS};
pub use metrics::metrics_routes;
pub use stats::stats_routes;
