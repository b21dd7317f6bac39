//! Pillars Shared Library
//!
//! This crate contains the telemetry model and the building blocks of the
//! Pillars pipeline: one request produces a span tree, metric points and log
//! records that all carry the same trace identifiers, so any one signal can be
//! used to find the other two.
//!
//! # Modules
//!
//! - [`models`] - Spans, metric points, log records, trace context, resources
//! - [`propagation`] - W3C `traceparent` parsing and header injection
//! - [`emitter`] - Request instrumentation with non-blocking export
//! - [`pipeline`] - The collector's processor chain
//! - [`export`] - Exporters for each backend
//! - [`correlate`] - Query derivation between signals
//! - [`config`] - Batching, retry and memory settings
//!
//! # Example
//!
//! ```
//! use shared::models::{LogRecord, Severity, TraceContext};
//!
//! let ctx = TraceContext::new_root();
//! let log = LogRecord::new(Severity::Info, "User logged in")
//!     .with_attribute("user_id", "12345")
//!     .with_context(&ctx);
//!
//! assert_eq!(log.trace_id(), Some(ctx.trace_id));
//! assert!(log.validate_record().is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod correlate;
pub mod emitter;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod propagation;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use url;
pub use validator;
