//! Telemetry receiver endpoints.
//!
//! One signal per call, JSON wire batches in the body:
//!
//! - `POST /v1/traces` - spans
//! - `POST /v1/metrics` - metric points
//! - `POST /v1/logs` - log records
//!
//! Responses follow OTLP/HTTP conventions: `200` with an optional
//! `partial_success`, `400` for undecodable bodies and `503` with
//! `Retry-After` when the memory guard refuses the data.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::models::{LogRecord, MetricPoint, SignalRecord, Span, WireBatch};
use shared::pipeline::{AdmissionError, Enrichable, Pipeline, SignalPipeline};
use thiserror::Error;

/// Seconds a refused client should wait before retrying.
pub const RETRY_AFTER_SECS: u64 = 1;

/// Response for export requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportResponse {
    /// Present when some records were rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_success: Option<PartialSuccess>,
}

/// Partial success information.
#[derive(Debug, Serialize, Deserialize)]
pub struct PartialSuccess {
    /// Number of rejected items.
    pub rejected_count: usize,
    /// Error message if any items were rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// HTTP status code.
    pub code: u16,
    /// Error message.
    pub message: String,
}

/// Reasons a whole request is refused.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The memory guard refused the request.
    #[error(transparent)]
    Overloaded(#[from] AdmissionError),

    /// The body is not a wire batch.
    #[error("Failed to decode JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Overloaded(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Decode(_) => StatusCode::BAD_REQUEST,
        };
        let body = Json(ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        });

        match self {
            Self::Overloaded(_) => (
                status,
                [(header::RETRY_AFTER, RETRY_AFTER_SECS.to_string())],
                body,
            )
                .into_response(),
            Self::Decode(_) => (status, body).into_response(),
        }
    }
}

/// A record type with its own stage in the pipeline.
pub trait Routed: SignalRecord + Enrichable + DeserializeOwned {
    /// The stages for this signal.
    fn stages(pipeline: &Pipeline) -> &SignalPipeline<Self>;
}

impl Routed for Span {
    fn stages(pipeline: &Pipeline) -> &SignalPipeline<Self> {
        &pipeline.traces
    }
}

impl Routed for MetricPoint {
    fn stages(pipeline: &Pipeline) -> &SignalPipeline<Self> {
        &pipeline.metrics
    }
}

impl Routed for LogRecord {
    fn stages(pipeline: &Pipeline) -> &SignalPipeline<Self> {
        &pipeline.logs
    }
}

/// Creates the receiver routes with application state.
pub fn ingest_routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/traces", post(ingest::<Span>))
        .route("/v1/metrics", post(ingest::<MetricPoint>))
        .route("/v1/logs", post(ingest::<LogRecord>))
        .with_state(state)
}

/// Runs one received batch through the processor chain.
///
/// The memory lease taken here travels with every accepted record and is
/// released once the last of them has been exported or dropped.
async fn ingest<T: Routed>(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ExportResponse>, IngestError> {
    let pipeline = state.pipeline();

    let lease = pipeline.admit(body.len() as u64).inspect_err(|e| {
        tracing::warn!(signal = %T::SIGNAL, error = %e, "Refusing batch");
    })?;

    let batch: WireBatch<T> = serde_json::from_slice(&body).inspect_err(|e| {
        tracing::error!(signal = %T::SIGNAL, error = %e, "Failed to decode batch");
    })?;

    let outcome = T::stages(pipeline).process(batch, Some(lease));

    let partial_success = (outcome.rejected > 0).then(|| PartialSuccess {
        rejected_count: outcome.rejected,
        error_message: outcome.error_message,
    });

    Ok(Json(ExportResponse { partial_success }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use shared::config::MemoryLimits;
    use tower::ServiceExt;

    async fn post(app: Router, uri: &str, body: String) -> Response {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_logs_json_valid() {
        let (state, exporters) = AppState::with_in_memory_exporters(&Config::default());
        let app = ingest_routes(state.clone());

        let body = json!({
            "resource": { "service.name": "flask-backend" },
            "records": [{
                "timestamp": "2026-01-01T00:00:00Z",
                "severity": "info",
                "message": "Incoming request",
                "attributes": { "method": "GET" }
            }]
        });
        let response = post(app, "/v1/logs", body.to_string()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({}));

        state.pipeline().force_flush().await.unwrap();
        assert_eq!(exporters.logs.records().len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_logs_empty_batch() {
        let (state, _) = AppState::with_in_memory_exporters(&Config::default());
        let app = ingest_routes(state);

        let body = json!({ "resource": { "service.name": "api" }, "records": [] });
        let response = post(app, "/v1/logs", body.to_string()).await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ingest_invalid_json() {
        let (state, _) = AppState::with_in_memory_exporters(&Config::default());
        let app = ingest_routes(state.clone());

        let response = post(app, "/v1/traces", "{not json".to_string()).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], 400);
        assert!(body["message"].as_str().unwrap().contains("decode"));
        assert_eq!(state.pipeline().guard().in_use(), 0);
    }

    #[tokio::test]
    async fn test_ingest_refused_over_memory_limit() {
        let config = Config {
            memory: MemoryLimits {
                limit_bytes: 64,
                spike_bytes: 16,
            },
            ..Config::default()
        };
        let (state, _) = AppState::with_in_memory_exporters(&config);
        let app = ingest_routes(state.clone());

        let body = json!({
            "resource": { "service.name": "flask-backend" },
            "records": [{
                "name": "http_requests_total",
                "kind": "counter",
                "value": 1.0,
                "timestamp": "2026-01-01T00:00:00Z"
            }]
        });
        let response = post(app, "/v1/metrics", body.to_string()).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            &RETRY_AFTER_SECS.to_string()
        );
        assert_eq!(state.pipeline().stats().memory.refused, 1);
    }
}
