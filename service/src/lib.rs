//! Pillars Demo Service
//!
//! A small task-manager API instrumented with the Pillars emitter. It exists
//! to produce realistic, correlated telemetry: every request yields a server
//! span continuing the caller's trace, child spans around each store call,
//! RED metrics and logs stamped with the trace and span IDs.
//!
//! # Routes
//!
//! - `GET/POST /api/tasks`, `GET/PUT/DELETE /api/tasks/{id}`
//! - `GET /api/simulate-error`, `GET /api/simulate-slow?delay=`
//! - `GET /health`, `/health/live`, `/health/ready`
//!
//! # Example
//!
//! ```no_run
//! use service::run_server;
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
mod error;
mod middleware;
mod routes;
mod state;
pub mod store;

pub use config::{Config, DEFAULT_MAX_SLOW_DELAY_SECS, DEFAULT_PORT};
pub use error::{ApiError, ErrorBody};
pub use middleware::UNMATCHED_ROUTE;
pub use routes::{SlowParams, TaskList, DEFAULT_SLOW_DELAY_SECS};
pub use state::AppState;

use anyhow::Result;
use axum::Router;
use shared::emitter::{Telemetry, TelemetryConfig};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Runs the service.
///
/// Server and telemetry settings are both read from environment variables.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;
    let telemetry = Telemetry::from_config(&TelemetryConfig::from_env()?)?;
    run_server_with_config(config, telemetry).await
}

/// Runs the service with the provided configuration and telemetry handle.
///
/// Buffered telemetry is flushed before returning.
///
/// # Errors
///
/// Returns an error if:
/// - The server fails to bind to the configured address
/// - A fatal error occurs during operation
pub async fn run_server_with_config(config: Config, telemetry: Telemetry) -> Result<()> {
    let addr = config.socket_addr()?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        service_name = %telemetry.resource().service_name,
        "Pillars demo service starting"
    );

    let state = AppState::from_config(&config, telemetry.clone());
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Flushing buffered telemetry");
    if let Err(e) = telemetry.shutdown().await {
        tracing::warn!(error = %e, "Telemetry was already shut down");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Creates the main application router with all routes and middleware.
///
/// This function is public to allow testing the router without starting a full server.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes(state.clone()))
        .merge(routes::task_routes(state.clone()))
        .merge(routes::simulate_routes(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::instrument,
        ))
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
