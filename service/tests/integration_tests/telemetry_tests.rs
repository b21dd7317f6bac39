//! What the service emits for each request.

use crate::common::{get, send, test_app};
use axum::http::{Method, StatusCode};
use serde_json::json;
use shared::correlate::{SpanRef, TraceToLogs};
use shared::emitter::{
    DATABASE_QUERY_DURATION_SECONDS, HTTP_ERRORS_TOTAL, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION_SECONDS,
};
use shared::models::{group_by_trace, Span, SpanKind, Trace, TraceId, TraceTreeError};
use shared::propagation::TraceParent;

const CALLER: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

#[tokio::test]
async fn test_request_continues_caller_trace() {
    let app = test_app();

    let (status, headers, _) = send(
        &app.router,
        Method::GET,
        "/api/tasks",
        &[("traceparent", CALLER)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    app.flush().await;

    let expected = TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap();
    let spans = app.emitted.spans.records();
    assert_eq!(spans.len(), 2);

    let server = spans.iter().find(|s| s.kind == SpanKind::Server).unwrap();
    assert_eq!(server.trace_id, expected);
    assert_eq!(server.name, "GET /api/tasks");
    assert_eq!(server.parent_span_id.unwrap().to_string(), "00f067aa0ba902b7");

    let child = spans.iter().find(|s| s.name == "get_all_tasks").unwrap();
    assert_eq!(child.trace_id, expected);
    assert_eq!(child.parent_span_id, Some(server.span_id));

    let returned: TraceParent = headers["traceparent"].to_str().unwrap().parse().unwrap();
    assert_eq!(returned.trace_id, expected);
    assert_eq!(returned.parent_id, server.span_id);
}

#[tokio::test]
async fn test_logs_carry_trace_context() {
    let app = test_app();

    get(&app.router, "/api/tasks").await;
    app.flush().await;

    let server_trace = app.emitted.spans.records()[0].trace_id;
    let logs = app.emitted.logs.records();
    let messages: Vec<&str> = logs.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(
        messages,
        [
            "Incoming request",
            "Retrieved 0 tasks from database",
            "Request completed"
        ]
    );
    assert!(logs.iter().all(|l| l.trace_id() == Some(server_trace)));
    assert!(logs.iter().all(|l| l.span_id().is_some()));
}

#[tokio::test]
async fn test_red_metrics_use_route_template() {
    let app = test_app();

    send(
        &app.router,
        Method::POST,
        "/api/tasks",
        &[],
        Some(&json!({ "title": "a" })),
    )
    .await;
    get(&app.router, "/api/tasks/1").await;
    get(&app.router, "/api/tasks/99").await;
    app.flush().await;

    let points = app.emitted.metrics.records();
    let requests: Vec<_> = points
        .iter()
        .filter(|p| p.name == HTTP_REQUESTS_TOTAL)
        .collect();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].labels["endpoint"], "/api/tasks/{id}");
    assert_eq!(requests[1].labels["method"], "GET");
    assert_eq!(requests[1].labels["status_code"], "200");

    assert_eq!(
        points
            .iter()
            .filter(|p| p.name == HTTP_REQUEST_DURATION_SECONDS)
            .count(),
        3
    );

    let errors: Vec<_> = points.iter().filter(|p| p.name == HTTP_ERRORS_TOTAL).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].labels["status_code"], "404");

    let queries: Vec<&str> = points
        .iter()
        .filter(|p| p.name == DATABASE_QUERY_DURATION_SECONDS)
        .map(|p| p.labels["operation"].as_str())
        .collect();
    assert_eq!(queries, ["insert", "select_by_id", "select_by_id"]);
}

#[tokio::test]
async fn test_simulated_error_marks_spans() {
    let app = test_app();

    get(&app.router, "/api/simulate-error").await;
    app.flush().await;

    let spans = app.emitted.spans.records();
    assert_eq!(spans.len(), 2);
    assert!(spans.iter().all(|s| s.status.is_error()));

    let logs = app.emitted.logs.records();
    assert!(logs
        .iter()
        .any(|l| l.message == "Simulated error triggered for testing"));
}

#[tokio::test]
async fn test_trace_to_logs_query_for_emitted_span() {
    let app = test_app();

    get(&app.router, "/health").await;
    app.flush().await;

    let spans = app.emitted.spans.records();
    let server = spans.iter().find(|s| s.kind == SpanKind::Server).unwrap();
    let span = SpanRef::from_span(server, app.telemetry.resource());

    let query = TraceToLogs::default().derive(&span);
    assert_eq!(
        query.query,
        format!(r#"{{service_name="flask-backend"}} |= "{}""#, server.trace_id)
    );
}

#[tokio::test]
async fn test_each_request_forms_one_span_tree() {
    let app = test_app();

    send(
        &app.router,
        Method::POST,
        "/api/tasks",
        &[],
        Some(&json!({ "title": "Rotate keys" })),
    )
    .await;
    get(&app.router, "/api/tasks").await;
    get(&app.router, "/api/tasks/1").await;
    get(&app.router, "/api/tasks/99").await;
    send(&app.router, Method::DELETE, "/api/tasks/1", &[], None).await;
    get(&app.router, "/api/simulate-error").await;
    app.flush().await;

    let traces = group_by_trace(app.emitted.spans.records());
    assert_eq!(traces.len(), 6);

    for spans in traces.into_values() {
        assert!(spans.iter().all(|s| s.end_time >= s.start_time));

        let trace = Trace::from_spans(spans).unwrap();
        trace.validate_tree().unwrap();

        let root = trace.root_span().unwrap();
        assert_eq!(root.kind, SpanKind::Server);
        assert_eq!(trace.children(root.span_id).len(), trace.span_count() - 1);
    }
}

#[tokio::test]
async fn test_continued_trace_hangs_off_the_caller() {
    let app = test_app();

    get(&app.router, "/health").await;
    send(
        &app.router,
        Method::GET,
        "/api/tasks",
        &[("traceparent", CALLER)],
        None,
    )
    .await;
    app.flush().await;

    let caller: TraceParent = CALLER.parse().unwrap();
    let spans: Vec<Span> = app
        .emitted
        .spans
        .records()
        .into_iter()
        .filter(|s| s.trace_id == caller.trace_id)
        .collect();

    // The caller's own span lives in another process.
    let local = Trace::from_spans(spans.clone()).unwrap();
    assert!(matches!(
        local.validate_tree(),
        Err(TraceTreeError::MissingParent { parent_span_id, .. }) if parent_span_id == caller.parent_id
    ));

    let mut whole = vec![Span::new(&caller.remote_context(), "frontend fetch")];
    whole.extend(spans);
    let trace = Trace::from_spans(whole).unwrap();
    trace.validate_tree().unwrap();
    assert_eq!(trace.span_count(), 3);
}
