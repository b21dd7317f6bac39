//! HTTP exporter with pluggable body encoding.
//!
//! Two encodings are supported:
//! - JSON wire batches (`{"resource": {...}, "records": [...]}`), accepted by
//!   another collector's `/v1/*` routes;
//! - Loki push bodies for log records, one stream per indexed label set.

use super::{ExportError, Exporter};
use crate::models::{LogRecord, WireBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

const MAX_ERROR_BODY: usize = 512;

type Encoder<T> = fn(&WireBatch<T>) -> Result<Vec<u8>, ExportError>;

/// Posts batches to an HTTP endpoint.
pub struct HttpExporter<T> {
    name: String,
    client: reqwest::Client,
    endpoint: Url,
    encode: Encoder<T>,
}

impl<T> std::fmt::Debug for HttpExporter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExporter")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

fn encode_json<T: Serialize>(batch: &WireBatch<T>) -> Result<Vec<u8>, ExportError> {
    Ok(serde_json::to_vec(batch)?)
}

fn encode_loki(batch: &WireBatch<LogRecord>) -> Result<Vec<u8>, ExportError> {
    Ok(serde_json::to_vec(&loki_push_body(batch))?)
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, ExportError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(ExportError::from)
}

impl<T: Serialize + Send + Sync> HttpExporter<T> {
    /// Creates an exporter that posts JSON wire batches to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn json(endpoint: Url, timeout: Duration) -> Result<Self, ExportError> {
        Ok(Self {
            name: format!("http:{}", endpoint.path()),
            client: build_client(timeout)?,
            endpoint,
            encode: encode_json::<T>,
        })
    }
}

impl HttpExporter<LogRecord> {
    /// Creates an exporter that posts Loki push bodies to `endpoint`
    /// (usually `.../loki/api/v1/push`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn loki(endpoint: Url, timeout: Duration) -> Result<Self, ExportError> {
        Ok(Self {
            name: "loki".to_string(),
            client: build_client(timeout)?,
            endpoint,
            encode: encode_loki,
        })
    }
}

impl<T> HttpExporter<T> {
    /// The target URL.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl<T: Send + Sync> Exporter<T> for HttpExporter<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &WireBatch<T>) -> Result<(), ExportError> {
        let body = (self.encode)(batch)?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(ExportError::Status {
            status: status.as_u16(),
            body,
            retry_after,
        })
    }
}

/// Parses a `Retry-After` value: either delay seconds or an HTTP date.
///
/// Dates in the past yield a zero delay.
#[must_use]
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Renders a log record as the JSON line stored by the log backend.
///
/// The trace and span IDs travel in the line itself so that a line filter on
/// the trace ID finds every log of a request.
#[must_use]
pub fn log_line(record: &LogRecord) -> String {
    let mut line = Map::new();
    line.insert("message".to_string(), Value::String(record.message.clone()));
    line.insert("severity".to_string(), Value::String(record.severity.to_string()));

    let mut keys: Vec<&String> = record.attributes.keys().collect();
    keys.sort();
    for key in keys {
        if let Ok(value) = serde_json::to_value(&record.attributes[key]) {
            line.insert(key.clone(), value);
        }
    }
    Value::Object(line).to_string()
}

/// Builds a Loki push body from a batch of log records.
///
/// Records are grouped into streams by their indexed labels. A record with no
/// labels falls back to `service_name` from the batch resource.
#[must_use]
pub fn loki_push_body(batch: &WireBatch<LogRecord>) -> Value {
    let mut streams: BTreeMap<BTreeMap<String, String>, Vec<[String; 2]>> = BTreeMap::new();

    for record in &batch.records {
        let labels = if record.labels.is_empty() {
            BTreeMap::from([(
                "service_name".to_string(),
                batch.resource.service_name.clone(),
            )])
        } else {
            record.labels.clone()
        };

        let ts = record
            .timestamp
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_string();

        streams.entry(labels).or_default().push([ts, log_line(record)]);
    }

    let streams: Vec<Value> = streams
        .into_iter()
        .map(|(stream, values)| json!({ "stream": stream, "values": values }))
        .collect();

    json!({ "streams": streams })
}
