//! `pillars correlate`: derive pivot queries from the command line.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde_json::{json, Value};
use shared::correlate::{LogToTrace, SpanRef, TraceToLogs, TraceToMetrics};
use shared::models::TraceId;
use std::time::Duration;
use url::Url;

/// Which pivot to derive.
#[derive(Subcommand, Debug)]
pub enum CorrelateCommand {
    /// Trace -> Logs: a LogQL query for the trace's log lines
    Logs {
        #[command(flatten)]
        span: SpanArgs,

        /// Loki base URL; prints the full query_range URL when set
        #[arg(long, env = "PILLARS_LOKI_URL")]
        loki_url: Option<Url>,
    },
    /// Trace -> Metrics: PromQL queries for the service's RED metrics
    Metrics {
        #[command(flatten)]
        span: SpanArgs,

        /// Prometheus base URL; prints full query_range URLs when set
        #[arg(long, env = "PILLARS_PROMETHEUS_URL")]
        prometheus_url: Option<Url>,

        /// Resolution step in seconds
        #[arg(long, default_value_t = 15)]
        step: u64,
    },
    /// Log -> Trace: find a trace id in a log line
    Trace {
        /// The log line to search
        #[arg(long)]
        line: String,

        /// Tempo base URL; prints the trace lookup URL when set
        #[arg(long, env = "PILLARS_TEMPO_URL")]
        tempo_url: Option<Url>,
    },
}

/// The span to correlate from.
#[derive(Args, Debug)]
pub struct SpanArgs {
    /// Trace id, 32 lowercase hex characters
    #[arg(long)]
    trace_id: TraceId,

    /// Service name of the span
    #[arg(long)]
    service: String,

    /// Span start (RFC 3339); defaults to now
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Span end (RFC 3339); defaults to the start
    #[arg(long)]
    end: Option<DateTime<Utc>>,
}

impl SpanArgs {
    fn span_ref(&self) -> Result<SpanRef> {
        let start = self.start.unwrap_or_else(Utc::now);
        let end = self.end.unwrap_or(start);
        anyhow::ensure!(end >= start, "--end must not be before --start");

        Ok(SpanRef::new(self.trace_id.to_string(), start, end)
            .with_tag("service.name", self.service.as_str()))
    }
}

/// Runs one correlate subcommand and returns what to print.
///
/// # Errors
///
/// Returns an error if the arguments are inconsistent or a backend URL
/// cannot carry a path.
pub fn run(command: &CorrelateCommand) -> Result<Value> {
    match command {
        CorrelateCommand::Logs { span, loki_url } => {
            let query = TraceToLogs::default().derive(&span.span_ref()?);
            let url = loki_url
                .as_ref()
                .map(|base| query.url(base))
                .transpose()?;
            Ok(json!({
                "query": query.query,
                "start": query.range.start,
                "end": query.range.end,
                "limit": query.limit,
                "url": url.map(String::from),
            }))
        }
        CorrelateCommand::Metrics {
            span,
            prometheus_url,
            step,
        } => {
            let step = chrono::Duration::from_std(Duration::from_secs(*step))
                .context("Step is out of range")?;
            let queries = TraceToMetrics::default()
                .derive(&span.span_ref()?)
                .into_iter()
                .map(|q| -> Result<Value> {
                    let url = prometheus_url
                        .as_ref()
                        .map(|base| q.url(base, step))
                        .transpose()?;
                    Ok(json!({
                        "name": q.name,
                        "query": q.query,
                        "start": q.range.start,
                        "end": q.range.end,
                        "url": url.map(String::from),
                    }))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(queries))
        }
        CorrelateCommand::Trace { line, tempo_url } => {
            let correlator =
                LogToTrace::try_default().context("Built-in trace id pattern is invalid")?;
            let Some(lookup) = correlator.derive_line(line) else {
                return Ok(json!({ "trace_id": null }));
            };
            let url = tempo_url
                .as_ref()
                .map(|base| lookup.url(base))
                .transpose()?;
            Ok(json!({
                "trace_id": lookup.trace_id.to_string(),
                "url": url.map(String::from),
            }))
        }
    }
}
