//! Pillars CLI
//!
//! Command-line tools for working with trace-correlated telemetry.
//!
//! # Usage
//!
//! ```bash
//! pillars --help
//! pillars health
//! pillars traceparent generate
//! pillars traceparent parse 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01
//! pillars correlate logs --trace-id 4bf92f3577b34da6a3ce929d0e0e4736 --service flask-backend
//! pillars correlate trace --line 'trace_id=4bf92f3577b34da6a3ce929d0e0e4736 Request completed'
//! pillars emit
//! ```

#![deny(unsafe_code)]

mod correlate;
mod emit;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use correlate::CorrelateCommand;
use serde_json::{json, Value};
use shared::emitter::TelemetryConfig;
use shared::models::TraceContext;
use shared::propagation::TraceParent;
use tracing_subscriber::EnvFilter;

/// Pillars CLI - trace-correlated telemetry tools
#[derive(Parser)]
#[command(name = "pillars")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Collector base URL
    #[arg(
        short,
        long,
        env = "PILLARS_COLLECTOR_URL",
        default_value = "http://localhost:4318"
    )]
    collector_url: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check collector health
    Health,

    /// Parse or generate W3C traceparent headers
    Traceparent {
        #[command(subcommand)]
        command: TraceparentCommand,
    },

    /// Derive cross-pillar pivot queries
    Correlate {
        #[command(subcommand)]
        command: CorrelateCommand,
    },

    /// Send one synthetic request's telemetry to the collector
    Emit {
        /// Collector base URL, overriding the global one
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TraceparentCommand {
    /// Decode a traceparent header
    Parse {
        /// Header value
        header: String,
    },
    /// Print a fresh root traceparent
    Generate {
        /// Clear the sampled flag
        #[arg(long)]
        unsampled: bool,
    },
}

fn traceparent(command: &TraceparentCommand) -> Result<Value> {
    match command {
        TraceparentCommand::Parse { header } => {
            let parsed = TraceParent::parse(header)
                .with_context(|| format!("Invalid traceparent: {header}"))?;
            Ok(json!({
                "version": parsed.version,
                "trace_id": parsed.trace_id.to_string(),
                "parent_id": parsed.parent_id.to_string(),
                "sampled": parsed.is_sampled(),
            }))
        }
        TraceparentCommand::Generate { unsampled } => {
            let mut ctx = TraceContext::new_root();
            ctx.sampled = !unsampled;
            Ok(Value::String(TraceParent::from_context(&ctx).to_string()))
        }
    }
}

async fn health(collector_url: &str) -> Result<Value> {
    let url = format!("{}/health", collector_url.trim_end_matches('/'));
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to reach collector at {url}"))?
        .error_for_status()?;
    Ok(response.json().await?)
}

fn print(value: &Value) -> Result<()> {
    match value {
        Value::String(s) => println!("{s}"),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let output = match cli.command {
        Some(Commands::Health) => health(&cli.collector_url).await?,
        Some(Commands::Traceparent { command }) => traceparent(&command)?,
        Some(Commands::Correlate { command }) => correlate::run(&command)?,
        Some(Commands::Emit { endpoint }) => {
            let config = TelemetryConfig::from_env()?
                .with_endpoint(endpoint.unwrap_or(cli.collector_url));
            emit::run(config).await?
        }
        None => {
            println!("Pillars CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
            return Ok(());
        }
    };

    print(&output)
}
