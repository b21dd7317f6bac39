//! Common test utilities and helpers for integration tests.

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use service::{create_router, AppState};
use shared::emitter::Telemetry;
use shared::export::InMemoryExporter;
use shared::models::{LogRecord, MetricPoint, Resource, Span};
use std::sync::Arc;

/// Everything the service emitted.
#[derive(Clone, Default)]
pub struct Emitted {
    pub spans: InMemoryExporter<Span>,
    pub metrics: InMemoryExporter<MetricPoint>,
    pub logs: InMemoryExporter<LogRecord>,
}

/// A router over a fresh store, exporting into memory.
pub struct TestApp {
    pub router: Router,
    pub telemetry: Telemetry,
    pub emitted: Emitted,
}

impl TestApp {
    /// Exports everything the service has emitted so far.
    pub async fn flush(&self) {
        self.telemetry.force_flush().await.unwrap();
    }
}

/// Creates a test app with default settings.
pub fn test_app() -> TestApp {
    test_app_with(|state| state)
}

/// Creates a test app, letting the caller adjust the state.
pub fn test_app_with(configure: impl FnOnce(AppState) -> AppState) -> TestApp {
    let emitted = Emitted::default();
    let telemetry = Telemetry::builder(
        Resource::new("flask-backend")
            .with_version("1.0.0")
            .with_environment("lab"),
    )
    .with_traces_exporter(Arc::new(emitted.spans.clone()))
    .with_metrics_exporter(Arc::new(emitted.metrics.clone()))
    .with_logs_exporter(Arc::new(emitted.logs.clone()))
    .build()
    .expect("default batch settings are valid");

    TestApp {
        router: create_router(configure(AppState::new(telemetry.clone()))),
        telemetry,
        emitted,
    }
}

/// Sends one request.
///
/// # Returns
///
/// A tuple containing the response status code, the response headers and the
/// parsed JSON response body (`Null` when the body is not JSON).
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<&Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_string(json).unwrap())
        }
        None => Body::empty(),
    };

    let response = tower::ServiceExt::oneshot(app.clone(), request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

    (status, headers, json)
}

/// Helper to make a GET request.
pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(app, Method::GET, uri, &[], None).await;
    (status, body)
}
