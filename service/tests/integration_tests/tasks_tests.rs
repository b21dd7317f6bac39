use crate::common::{get, send, test_app, test_app_with};
use axum::http::{Method, StatusCode};
use serde_json::json;
use service::store::{NewTask, Task, TaskStore, TaskStoreError, TaskUpdate};
use std::sync::Arc;

/// A store whose lock is always poisoned.
struct BrokenStore;

impl TaskStore for BrokenStore {
    fn list(&self) -> Result<Vec<Task>, TaskStoreError> {
        Err(TaskStoreError::LockError)
    }

    fn get(&self, _id: u64) -> Result<Option<Task>, TaskStoreError> {
        Err(TaskStoreError::LockError)
    }

    fn create(&self, _task: NewTask) -> Result<Task, TaskStoreError> {
        Err(TaskStoreError::LockError)
    }

    fn update(&self, _id: u64, _update: TaskUpdate) -> Result<Option<Task>, TaskStoreError> {
        Err(TaskStoreError::LockError)
    }

    fn delete(&self, _id: u64) -> Result<bool, TaskStoreError> {
        Err(TaskStoreError::LockError)
    }
}

#[tokio::test]
async fn test_task_lifecycle() {
    let app = test_app();

    let (status, _, created) = send(
        &app.router,
        Method::POST,
        "/api/tasks",
        &[],
        Some(&json!({ "title": "Write runbook", "description": "for on-call" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], 1);
    assert_eq!(created["title"], "Write runbook");
    assert_eq!(created["completed"], false);
    assert!(created["created_at"].is_string());

    let (status, list) = get(&app.router, "/api/tasks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 1);
    assert_eq!(list["tasks"][0]["title"], "Write runbook");

    let (status, _, updated) = send(
        &app.router,
        Method::PUT,
        "/api/tasks/1",
        &[],
        Some(&json!({ "completed": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["completed"], true);
    assert_eq!(updated["description"], "for on-call");

    let (status, fetched) = get(&app.router, "/api/tasks/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, updated);

    let (status, _, deleted) = send(&app.router, Method::DELETE, "/api/tasks/1", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["message"], "Task deleted successfully");

    let (status, list) = get(&app.router, "/api/tasks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 0);
}

#[tokio::test]
async fn test_missing_task_is_not_found() {
    let app = test_app();

    let (status, body) = get(&app.router, "/api/tasks/7").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Task not found");

    let (status, _, _) = send(
        &app.router,
        Method::PUT,
        "/api/tasks/7",
        &[],
        Some(&json!({ "title": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app.router, Method::DELETE, "/api/tasks/7", &[], None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_requires_title() {
    let app = test_app();

    for body in [json!({ "description": "no title" }), json!({ "title": "" })] {
        let (status, _, response) =
            send(&app.router, Method::POST, "/api/tasks", &[], Some(&body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(response["error"].as_str().unwrap().contains("Title is required"));
    }

    let (_, list) = get(&app.router, "/api/tasks").await;
    assert_eq!(list["count"], 0);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = test_app();

    let (status, _, body) = send(
        &app.router,
        Method::POST,
        "/api/tasks",
        &[("content-type", "application/json")],
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = test_app();

    let (status, body) = get(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());

    let (_, body) = get(&app.router, "/health/live").await;
    assert_eq!(body["status"], "alive");

    let (_, body) = get(&app.router, "/health/ready").await;
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_health_detailed_reports_components() {
    let app = test_app();

    let (status, body) = get(&app.router, "/health/detailed").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"]["status"], "healthy");
    assert!(body["checks"]["database"]["latency_ms"].is_number());
    assert_eq!(body["checks"]["otel_collector"]["status"], "healthy");
}

#[tokio::test]
async fn test_health_with_broken_store() {
    let app = test_app_with(|state| state.with_task_store(Arc::new(BrokenStore)));

    let (status, body) = get(&app.router, "/health/detailed").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"]["database"]["status"], "unhealthy");
    assert!(body["checks"]["database"]["error"].is_string());

    let (status, body) = get(&app.router, "/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_ready");

    let (status, _) = get(&app.router, "/health/live").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_store_failure_returns_500() {
    let app = test_app_with(|state| state.with_task_store(Arc::new(BrokenStore)));

    let (status, body) = get(&app.router, "/api/tasks").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("Failed to retrieve tasks"));
}
