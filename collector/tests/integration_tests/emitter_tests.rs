//! An emitter talking to a real collector over HTTP.

use collector::{create_router, AppState, Config, MemoryExporters};
use shared::emitter::{Telemetry, TelemetryConfig, HTTP_REQUESTS_TOTAL};
use shared::models::{
    group_by_trace, Attributes, Resource, Severity, SpanKind, Trace, TraceId,
};
use shared::propagation::{self, TRACEPARENT_HEADER};
use std::collections::HashMap;
use std::net::SocketAddr;

async fn spawn_collector() -> (SocketAddr, AppState, MemoryExporters) {
    let (state, exported) = AppState::with_in_memory_exporters(&Config::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let router = create_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, state, exported)
}

#[tokio::test]
async fn test_request_continues_caller_trace_across_pillars() {
    let (addr, state, exported) = spawn_collector().await;
    let telemetry =
        Telemetry::from_config(&TelemetryConfig::default().with_endpoint(format!("http://{addr}")))
            .unwrap();

    let headers = HashMap::from([(
        TRACEPARENT_HEADER.to_string(),
        "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
    )]);

    let scope = telemetry.begin_server_request(&headers, "GET", "/api/tasks");
    let ctx = scope.context();
    let db = telemetry.start_span("db.query", Some(&ctx));
    db.log(Severity::Info, "Fetching all tasks", Attributes::new());
    db.end();
    telemetry.end_request(scope, 200);

    telemetry.force_flush().await.unwrap();
    state.pipeline().force_flush().await.unwrap();

    let expected = TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap();

    let spans = exported.traces.records();
    assert_eq!(spans.len(), 2);
    assert!(spans.iter().all(|s| s.trace_id == expected));
    let server = spans.iter().find(|s| s.kind == SpanKind::Server).unwrap();
    assert_eq!(server.name, "GET /api/tasks");
    assert_eq!(server.parent_span_id.unwrap().to_string(), "00f067aa0ba902b7");
    let child = spans.iter().find(|s| s.name == "db.query").unwrap();
    assert_eq!(child.parent_span_id, Some(server.span_id));

    let logs = exported.logs.records();
    let messages: Vec<&str> = logs.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(
        messages,
        ["Incoming request", "Fetching all tasks", "Request completed"]
    );
    for log in &logs {
        assert_eq!(log.trace_id(), Some(expected));
        assert_eq!(
            log.labels.get("service_name").map(String::as_str),
            Some("flask-backend")
        );
    }

    let points = exported.metrics.records();
    let requests = points
        .iter()
        .find(|p| p.name == HTTP_REQUESTS_TOTAL)
        .unwrap();
    assert_eq!(requests.labels.get("service_name").map(String::as_str), Some("flask-backend"));
    assert_eq!(requests.labels.get("status_code").map(String::as_str), Some("200"));
    assert!(points.iter().all(|p| p.name != "http_errors_total"));

    telemetry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_server_errors_are_counted() {
    let (addr, state, exported) = spawn_collector().await;
    let telemetry =
        Telemetry::from_config(&TelemetryConfig::default().with_endpoint(format!("http://{addr}")))
            .unwrap();

    let headers: HashMap<String, String> = HashMap::new();
    let scope = telemetry.begin_server_request(&headers, "GET", "/api/simulate-error");
    telemetry.end_request(scope, 500);

    telemetry.force_flush().await.unwrap();
    state.pipeline().force_flush().await.unwrap();

    let spans = exported.traces.records();
    assert_eq!(spans.len(), 1);
    assert!(spans[0].status.is_error());
    assert!(spans[0].parent_span_id.is_none());

    let errors: Vec<_> = exported
        .metrics
        .records()
        .into_iter()
        .filter(|p| p.name == "http_errors_total")
        .collect();
    assert_eq!(errors.len(), 1);

    let completed = exported
        .logs
        .records()
        .into_iter()
        .find(|l| l.message == "Request completed")
        .unwrap();
    assert_eq!(completed.severity, Severity::Error);

    assert_eq!(telemetry.stats().traces.exported_records, 1);
    telemetry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_two_services_share_one_span_tree() {
    let (addr, state, exported) = spawn_collector().await;
    let endpoint = format!("http://{addr}");
    let gateway = Telemetry::from_config(
        &TelemetryConfig::default()
            .with_endpoint(endpoint.clone())
            .with_resource(Resource::new("gateway")),
    )
    .unwrap();
    let backend =
        Telemetry::from_config(&TelemetryConfig::default().with_endpoint(endpoint)).unwrap();

    let no_headers: HashMap<String, String> = HashMap::new();
    let incoming = gateway.begin_server_request(&no_headers, "GET", "/tasks");
    let call = gateway.start_span_with_kind(
        "GET /api/tasks",
        Some(&incoming.context()),
        SpanKind::Client,
    );

    let mut outgoing: HashMap<String, String> = HashMap::new();
    propagation::inject(&call.context(), &mut outgoing);

    let handled = backend.begin_server_request(&outgoing, "GET", "/api/tasks");
    backend
        .start_span("get_all_tasks", Some(&handled.context()))
        .end();
    backend.end_request(handled, 200);

    call.end();
    gateway.end_request(incoming, 200);

    gateway.force_flush().await.unwrap();
    backend.force_flush().await.unwrap();
    state.pipeline().force_flush().await.unwrap();

    let traces = group_by_trace(exported.traces.records());
    assert_eq!(traces.len(), 1);

    let trace = Trace::from_spans(traces.into_values().next().unwrap()).unwrap();
    trace.validate_tree().unwrap();
    assert_eq!(trace.span_count(), 4);
    assert!(trace.spans.iter().all(|s| s.end_time >= s.start_time));

    let root = trace.root_span().unwrap();
    assert_eq!(root.name, "GET /tasks");
    let client = trace.children(root.span_id)[0];
    assert_eq!(client.kind, SpanKind::Client);
    let server = trace.children(client.span_id)[0];
    assert_eq!(server.name, "GET /api/tasks");
    assert_eq!(server.kind, SpanKind::Server);
    assert_eq!(trace.children(server.span_id)[0].name, "get_all_tasks");

    gateway.shutdown().await.unwrap();
    backend.shutdown().await.unwrap();
}
