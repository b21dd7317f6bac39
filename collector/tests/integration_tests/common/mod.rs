//! Common test utilities and helpers for integration tests.
//!
//! This module provides shared functionality used across all integration tests,
//! including test app setup and HTTP request helpers.

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use collector::{create_router, AppState, Config, MemoryExporters};
use http_body_util::BodyExt;
use serde_json::Value;

/// A router over fresh in-memory exporters.
pub struct TestApp {
    /// The router under test.
    pub router: Router,
    /// State shared with the router.
    pub state: AppState,
    /// Everything the collector exported.
    pub exported: MemoryExporters,
}

/// Creates a test app with the default configuration.
pub fn test_app() -> TestApp {
    test_app_with(&Config::default())
}

/// Creates a test app with the given configuration.
pub fn test_app_with(config: &Config) -> TestApp {
    let (state, exported) = AppState::with_in_memory_exporters(config);
    TestApp {
        router: create_router(state.clone()),
        state,
        exported,
    }
}

/// Helper to make a POST request with JSON body.
///
/// # Returns
///
/// A tuple containing the response status code, the response headers and the
/// parsed JSON response body.
pub async fn post_json(app: Router, uri: &str, body: &Value) -> (StatusCode, HeaderMap, Value) {
    let response = tower::ServiceExt::oneshot(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap(),
    )
    .await
    .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

    (status, headers, json)
}

/// Helper to make a GET request.
///
/// # Returns
///
/// A tuple containing the response status code and parsed JSON response body.
pub async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = tower::ServiceExt::oneshot(
        app,
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

    (status, json)
}
