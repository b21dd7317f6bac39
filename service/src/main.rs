//! Pillars Demo Service Binary
//!
//! Entry point for the instrumented task API.

#![deny(unsafe_code)]

use anyhow::Result;
use service::Config;
use shared::emitter::{Telemetry, TelemetryConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    let telemetry_config = TelemetryConfig::from_env()?;
    tracing::info!(
        endpoint = %telemetry_config.endpoint,
        service_name = %telemetry_config.resource.service_name,
        "Exporting telemetry"
    );
    let telemetry = Telemetry::from_config(&telemetry_config)?;

    service::run_server_with_config(config, telemetry).await
}

/// Installs the log subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
