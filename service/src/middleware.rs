//! Per-request instrumentation.
//!
//! Every request gets a server span that continues the caller's trace, the
//! RED metrics and the `Incoming request` / `Request completed` logs. The
//! request's [`TraceContext`] is stored in the request extensions so handlers
//! can open child spans, and the response carries a `traceparent` header.

use crate::state::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use shared::models::TraceContext;
use shared::propagation;

/// Route label used when no route matched.
pub const UNMATCHED_ROUTE: &str = "unknown";

/// Wraps one request in a server span.
pub async fn instrument(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_ROUTE, MatchedPath::as_str)
        .to_string();

    let telemetry = state.telemetry();
    let scope = telemetry.begin_server_request(request.headers(), &method, &route);
    let ctx: TraceContext = scope.context();
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;

    propagation::inject(&ctx, response.headers_mut());
    telemetry.end_request(scope, response.status().as_u16());
    response
}
