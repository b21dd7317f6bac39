//! Task CRUD endpoints.
//!
//! Each handler runs inside the request's server span and opens one child
//! span around its store call. Store calls are timed into
//! `database_query_duration_seconds`.

use super::timed_query;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{NewTask, Task, TaskUpdate};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use shared::emitter::SpanHandle;
use shared::models::{Attributes, Severity, TraceContext};
use validator::Validate;

/// Response body of `GET /api/tasks`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskList {
    /// Every task, ordered by id.
    pub tasks: Vec<Task>,
    /// Number of tasks.
    pub count: usize,
}

/// Creates the task routes.
///
/// # Routes
///
/// - `GET /api/tasks` - List tasks
/// - `POST /api/tasks` - Create a task
/// - `GET /api/tasks/{id}` - Fetch one task
/// - `PUT /api/tasks/{id}` - Update a task
/// - `DELETE /api/tasks/{id}` - Delete a task
pub fn task_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .with_state(state)
}

/// Marks the span failed and logs the error before it becomes a response.
fn failed(span: &mut SpanHandle, error: ApiError) -> ApiError {
    let detail = match std::error::Error::source(&error) {
        Some(source) => format!("{error}: {source}"),
        None => error.to_string(),
    };
    tracing::warn!(error = %detail, "Task request failed");
    span.record_error(&detail);
    span.log(Severity::Error, detail, Attributes::new());
    error
}

fn not_found(span: &mut SpanHandle, id: u64, message: String) -> ApiError {
    span.set_attribute("task.found", false);
    span.log(Severity::Warn, message, Attributes::new());
    ApiError::NotFound(id)
}

fn body<T>(span: &mut SpanHandle, payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError>
where
    T: Validate,
{
    let invalid = |span: &mut SpanHandle, message: String| {
        span.set_attribute("validation.failed", true);
        span.log(Severity::Warn, format!("Invalid task body: {message}"), Attributes::new());
        ApiError::Validation(message)
    };

    let Json(value) = payload.map_err(|rejection| invalid(span, rejection.body_text()))?;
    value.validate().map_err(|e| invalid(span, e.to_string()))?;
    Ok(value)
}

/// Handler for `GET /api/tasks`.
async fn list_tasks(
    State(state): State<AppState>,
    Extension(ctx): Extension<TraceContext>,
) -> Result<Json<TaskList>, ApiError> {
    let telemetry = state.telemetry();
    let mut span = telemetry.start_span("get_all_tasks", Some(&ctx));

    let (result, elapsed) = timed_query(telemetry, "select", || state.tasks().list());
    let tasks = result
        .map_err(ApiError::store("Failed to retrieve tasks"))
        .map_err(|e| failed(&mut span, e))?;

    span.set_attribute("db.query.duration", elapsed);
    span.set_attribute("db.result.count", tasks.len());
    span.log(
        Severity::Info,
        format!("Retrieved {} tasks from database", tasks.len()),
        Attributes::new(),
    );

    let count = tasks.len();
    Ok(Json(TaskList { tasks, count }))
}

/// Handler for `GET /api/tasks/{id}`.
async fn get_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<TraceContext>,
    Path(id): Path<u64>,
) -> Result<Json<Task>, ApiError> {
    let telemetry = state.telemetry();
    let mut span = telemetry.start_span("get_task_by_id", Some(&ctx));
    span.set_attribute("task.id", id);

    let (result, _) = timed_query(telemetry, "select_by_id", || state.tasks().get(id));
    let task = result
        .map_err(ApiError::store("Failed to retrieve task"))
        .map_err(|e| failed(&mut span, e))?
        .ok_or_else(|| not_found(&mut span, id, format!("Task {id} not found")))?;

    span.set_attribute("task.found", true);
    span.log(Severity::Info, format!("Retrieved task {id}"), Attributes::new());

    Ok(Json(task))
}

/// Handler for `POST /api/tasks`.
async fn create_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<TraceContext>,
    payload: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let telemetry = state.telemetry();
    let mut span = telemetry.start_span("create_task", Some(&ctx));

    let new_task = body(&mut span, payload)?;
    span.set_attribute("task.title", new_task.title.as_str());

    let (result, elapsed) = timed_query(telemetry, "insert", || state.tasks().create(new_task));
    let task = result
        .map_err(ApiError::store("Failed to create task"))
        .map_err(|e| failed(&mut span, e))?;

    span.set_attribute("task.id", task.id);
    span.set_attribute("db.query.duration", elapsed);
    span.log(
        Severity::Info,
        format!("Created new task {}: {}", task.id, task.title),
        Attributes::new(),
    );

    Ok((StatusCode::CREATED, Json(task)))
}

/// Handler for `PUT /api/tasks/{id}`.
async fn update_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<TraceContext>,
    Path(id): Path<u64>,
    payload: Result<Json<TaskUpdate>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let telemetry = state.telemetry();
    let mut span = telemetry.start_span("update_task", Some(&ctx));
    span.set_attribute("task.id", id);

    let update = body(&mut span, payload)?;
    if let Some(completed) = update.completed {
        span.set_attribute("task.completed", completed);
    }

    let (result, elapsed) = timed_query(telemetry, "update", || state.tasks().update(id, update));
    let task = result
        .map_err(ApiError::store("Failed to update task"))
        .map_err(|e| failed(&mut span, e))?
        .ok_or_else(|| not_found(&mut span, id, format!("Task {id} not found for update")))?;

    span.set_attribute("db.query.duration", elapsed);
    span.log(Severity::Info, format!("Updated task {id}"), Attributes::new());

    Ok(Json(task))
}

/// Handler for `DELETE /api/tasks/{id}`.
async fn delete_task(
    State(state): State<AppState>,
    Extension(ctx): Extension<TraceContext>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let telemetry = state.telemetry();
    let mut span = telemetry.start_span("delete_task", Some(&ctx));
    span.set_attribute("task.id", id);

    let (result, elapsed) = timed_query(telemetry, "delete", || state.tasks().delete(id));
    let deleted = result
        .map_err(ApiError::store("Failed to delete task"))
        .map_err(|e| failed(&mut span, e))?;
    if !deleted {
        return Err(not_found(&mut span, id, format!("Task {id} not found for deletion")));
    }

    span.set_attribute("db.query.duration", elapsed);
    span.log(Severity::Info, format!("Deleted task {id}"), Attributes::new());

    Ok(Json(serde_json::json!({ "message": "Task deleted successfully" })))
}
