use crate::common::{get, post_json, test_app, test_app_with};
use axum::http::StatusCode;
use collector::Config;
use serde_json::json;
use shared::models::{
    LogRecord, MetricKind, MetricPoint, Resource, Severity, Span, SpanStatus, TraceContext,
    WireBatch,
};
use shared::pipeline::AttributeAction;
use tokio_test::assert_ok;

fn backend() -> Resource {
    Resource::new("flask-backend")
        .with_version("1.0.0")
        .with_environment("lab")
}

#[tokio::test]
async fn test_spans_are_tagged_and_exported() {
    let app = test_app_with(&Config {
        instance_id: "collector-a".to_string(),
        resource_attributes: vec![("region".to_string(), "eu".to_string())],
        ..Config::default()
    });

    let root = TraceContext::new_root();
    let child = root.child();
    let batch = WireBatch::new(
        backend(),
        vec![
            Span::new(&root, "GET /api/tasks"),
            Span::new(&child, "db.query").with_status(SpanStatus::Ok),
        ],
    );

    let (status, _, body) =
        post_json(app.router, "/v1/traces", &serde_json::to_value(&batch).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("partial_success").is_none());

    assert_ok!(app.state.pipeline().force_flush().await);

    let batches = app.exported.traces.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0].resource.service_instance_id.as_deref(),
        Some("collector-a")
    );
    assert_eq!(batches[0].resource.attribute("region").as_deref(), Some("eu"));
    let spans = &batches[0].records;
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].trace_id, root.trace_id);
    assert_eq!(spans[1].parent_span_id, Some(root.span_id));
}

#[tokio::test]
async fn test_logs_get_service_name_label() {
    let app = test_app();

    let ctx = TraceContext::new_root();
    let batch = WireBatch::new(
        backend(),
        vec![
            LogRecord::new(Severity::Info, "Incoming request").with_context(&ctx),
            LogRecord::new(Severity::Info, "Fetching all tasks").with_context(&ctx),
            LogRecord::new(Severity::Error, "Simulated error for testing"),
        ],
    );

    let (status, _, _) =
        post_json(app.router, "/v1/logs", &serde_json::to_value(&batch).unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    assert_ok!(app.state.pipeline().force_flush().await);

    let records = app.exported.logs.records();
    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(
            record.labels.get("service_name").map(String::as_str),
            Some("flask-backend")
        );
        assert_eq!(
            record.labels.get("deployment_environment").map(String::as_str),
            Some("lab")
        );
    }
    assert_eq!(records[0].trace_id(), Some(ctx.trace_id));
}

#[tokio::test]
async fn test_metrics_are_enriched() {
    let app = test_app_with(&Config {
        attribute_actions: vec![
            AttributeAction::insert("cluster", "lab-1"),
            AttributeAction::delete("pod"),
        ],
        ..Config::default()
    });

    let point = MetricPoint::counter("http_requests_total", 1.0)
        .with_label("method", "GET")
        .with_label("pod", "backend-7f9c");
    let batch = WireBatch::new(backend(), vec![point]);

    let (status, _, _) =
        post_json(app.router, "/v1/metrics", &serde_json::to_value(&batch).unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    assert_ok!(app.state.pipeline().force_flush().await);

    let points = app.exported.metrics.records();
    assert_eq!(points.len(), 1);
    let labels = &points[0].labels;
    assert_eq!(labels.get("cluster").map(String::as_str), Some("lab-1"));
    assert_eq!(labels.get("service_name").map(String::as_str), Some("flask-backend"));
    assert_eq!(labels.get("method").map(String::as_str), Some("GET"));
    assert!(!labels.contains_key("pod"));
    assert_eq!(points[0].kind, MetricKind::Counter);
}

#[tokio::test]
async fn test_partial_success_for_invalid_records() {
    let app = test_app();

    let ctx = TraceContext::new_root();
    let batch = WireBatch::new(
        backend(),
        vec![Span::new(&ctx, "GET /health"), Span::new(&ctx.child(), "")],
    );

    let (status, _, body) =
        post_json(app.router, "/v1/traces", &serde_json::to_value(&batch).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["partial_success"]["rejected_count"], 1);
    assert!(body["partial_success"]["error_message"].is_string());

    assert_ok!(app.state.pipeline().force_flush().await);
    assert_eq!(app.exported.traces.records().len(), 1);
}

#[tokio::test]
async fn test_negative_counter_rejected() {
    let app = test_app();

    let body = json!({
        "resource": { "service.name": "flask-backend" },
        "records": [{
            "name": "http_requests_total",
            "kind": "counter",
            "value": -1.0,
            "timestamp": "2026-01-01T00:00:00Z"
        }]
    });

    let (status, _, body) = post_json(app.router, "/v1/metrics", &body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["partial_success"]["rejected_count"], 1);
}

#[tokio::test]
async fn test_wrong_signal_shape_is_bad_request() {
    let app = test_app();

    let logs = WireBatch::new(backend(), vec![LogRecord::new(Severity::Info, "hello")]);
    let (status, _, body) =
        post_json(app.router, "/v1/traces", &serde_json::to_value(&logs).unwrap()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_stats_count_exported_records() {
    let app = test_app();

    let batch = WireBatch::new(
        backend(),
        vec![
            LogRecord::new(Severity::Info, "a"),
            LogRecord::new(Severity::Info, "b"),
        ],
    );
    post_json(
        app.router.clone(),
        "/v1/logs",
        &serde_json::to_value(&batch).unwrap(),
    )
    .await;
    assert_ok!(app.state.pipeline().force_flush().await);

    let (_, stats) = get(app.router, "/stats").await;
    assert_eq!(stats["logs"]["exported_records"], 2);
    assert_eq!(stats["logs"]["exported_batches"], 1);
    assert_eq!(stats["traces"]["exported_records"], 0);
}
