//! Pillars Collector Binary
//!
//! Entry point for the telemetry collector.

#![deny(unsafe_code)]

use anyhow::Result;
use collector::Config;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let prometheus = PrometheusBuilder::new().install_recorder()?;
    let config = Config::from_env()?;

    collector::run_server_with_config(config, Some(prometheus)).await
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
