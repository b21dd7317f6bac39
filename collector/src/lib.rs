//! Pillars Collector
//!
//! This crate provides the HTTP receiver that sits between instrumented
//! services and the trace, metric and log backends. Every batch it receives
//! runs through a fixed chain of processors before being fanned out:
//!
//! ```text
//! memory guard -> resource tagging -> attribute enrichment -> batching -> export
//! ```
//!
//! # Architecture
//!
//! The collector is built on Axum and Tokio, providing:
//! - `POST /v1/traces`, `/v1/metrics`, `/v1/logs` receivers
//! - Health probes for orchestrators
//! - `/stats` and `/metrics` for its own counters
//!
//! The receiver never waits on a backend: records are queued for a background
//! flush task per signal, and a full queue drops records rather than blocking.
//!
//! # Example
//!
//! ```no_run
//! use collector::run_server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_server().await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod exporters;
mod routes;
mod state;

pub use config::{Config, DebugVerbosity, LogsFormat, DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT};
pub use exporters::{build_pipeline, Exporters, MemoryExporters};
pub use routes::{ExportResponse, PartialSuccess, Routed, RETRY_AFTER_SECS};
pub use state::AppState;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Runs the collector.
///
/// This function initializes the server with configuration from environment variables
/// and starts listening for incoming connections. It handles graceful shutdown on
/// SIGTERM/SIGINT signals.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;
    run_server_with_config(config, None).await
}

/// Runs the collector with the provided configuration.
///
/// When `prometheus` is set, the collector's own counters are served on
/// `/metrics`. Buffered data is flushed before returning.
///
/// # Errors
///
/// Returns an error if:
/// - An exporter cannot be created
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server_with_config(
    config: Config,
    prometheus: Option<PrometheusHandle>,
) -> Result<()> {
    let addr = config.socket_addr()?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        instance_id = %config.instance_id,
        memory_limit_bytes = config.memory.limit_bytes,
        logs_format = %config.logs_format,
        debug = %config.debug,
        "Pillars collector starting"
    );

    let mut state = AppState::from_config(&config)?;
    if let Some(handle) = prometheus {
        state = state.with_prometheus(handle);
    }

    let app = create_router(state.clone());
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Flushing buffered telemetry");
    if let Err(e) = state.pipeline().shutdown().await {
        tracing::warn!(error = %e, "Pipeline was already stopped");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Creates the main application router with all routes and middleware.
///
/// This function is public to allow testing the router without starting a full server.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.max_body_bytes();

    Router::new()
        .merge(routes::health_routes(state.clone()))
        .merge(routes::ingest_routes(state.clone()))
        .merge(routes::stats_routes(state.clone()))
        .merge(routes::metrics_routes(state))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        // Browsers post telemetry cross-origin.
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let (state, _) = AppState::with_in_memory_exporters(&Config::default());
        create_router(state)
    }

    #[tokio::test]
    async fn test_health_endpoint_returns_json() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok());
        assert!(content_type.is_some_and(|ct| ct.contains("application/json")));
    }

    #[tokio::test]
    async fn test_body_limit() {
        let (state, _) = AppState::with_in_memory_exporters(&Config::default());
        let app = create_router(state.with_max_body_bytes(16));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/logs")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(vec![b' '; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_cors_preflight_allowed() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/v1/traces")
                    .header(header::ORIGIN, "http://localhost:8080")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
