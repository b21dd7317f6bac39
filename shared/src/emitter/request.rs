//! Per-request instrumentation: the server span plus RED metrics.

use super::span::SpanHandle;
use crate::models::{Attributes, SpanStatus, TraceContext};
use std::time::Instant;

/// Counter of handled requests.
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
/// Histogram of request latency in seconds.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
/// Counter of requests answered with status 400 or above.
pub const HTTP_ERRORS_TOTAL: &str = "http_errors_total";
/// Histogram of database query latency in seconds.
pub const DATABASE_QUERY_DURATION_SECONDS: &str = "database_query_duration_seconds";

/// The server span of one incoming request.
///
/// Created by [`Telemetry::begin_server_request`](super::Telemetry::begin_server_request)
/// and closed by [`Telemetry::end_request`](super::Telemetry::end_request).
/// Dropping the scope without ending it still seals the span, but records no
/// metrics.
#[derive(Debug)]
pub struct RequestScope {
    pub(super) span: SpanHandle,
    pub(super) method: String,
    pub(super) route: String,
    pub(super) started: Instant,
}

impl RequestScope {
    /// Context for child spans and correlated logs.
    #[must_use]
    pub fn context(&self) -> TraceContext {
        self.span.context()
    }

    /// The server span.
    pub fn span_mut(&mut self) -> &mut SpanHandle {
        &mut self.span
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Route template or path.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    pub(super) fn finish(mut self, status_code: u16) -> (SpanHandle, f64) {
        let elapsed = self.started.elapsed().as_secs_f64();
        self.span.set_attribute("http.response.status_code", status_code);
        if status_code >= 500 {
            self.span.set_status(SpanStatus::error(format!("HTTP {status_code}")));
        }
        (self.span, elapsed)
    }
}

/// Attributes attached to the `Incoming request` and `Request completed` logs.
pub(super) fn request_attributes(method: &str, route: &str) -> Attributes {
    Attributes::from([
        ("method".to_string(), method.into()),
        ("path".to_string(), route.into()),
    ])
}
