//! Declarative attribute edits and log label promotion.
//!
//! Actions run in configuration order on every record:
//! - `insert` sets a key only when it is absent;
//! - `upsert` sets a key unconditionally;
//! - `delete` removes a key.
//!
//! Label promotion copies selected resource attributes into the indexed labels
//! of log records and metric points, renaming `service.name` to
//! `service_name` so the names are valid label identifiers.

use crate::models::{AttributeValue, LogRecord, MetricPoint, Resource, Span};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Resource attributes promoted to labels unless configured otherwise.
pub const DEFAULT_PROMOTED_LABELS: &[&str] = &["service.name", "deployment.environment"];

/// What an [`AttributeAction`] does.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Set the value only if the key is absent.
    Insert(AttributeValue),
    /// Set the value, replacing any existing one.
    Upsert(AttributeValue),
    /// Remove the key.
    Delete,
}

/// One attribute edit.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeAction {
    /// Attribute key.
    pub key: String,
    /// The edit.
    pub kind: ActionKind,
}

impl AttributeAction {
    /// Insert `value` under `key` if absent.
    #[must_use]
    pub fn insert(key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            key: key.into(),
            kind: ActionKind::Insert(value.into()),
        }
    }

    /// Set `value` under `key`.
    #[must_use]
    pub fn upsert(key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            key: key.into(),
            kind: ActionKind::Upsert(value.into()),
        }
    }

    /// Remove `key`.
    #[must_use]
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: ActionKind::Delete,
        }
    }
}

/// Error parsing an action from its text form.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid attribute action '{0}', expected insert:key=value, upsert:key=value or delete:key")]
pub struct ActionParseError(String);

impl FromStr for AttributeAction {
    type Err = ActionParseError;

    /// Parses `insert:key=value`, `upsert:key=value` or `delete:key`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ActionParseError(s.to_string());
        let (op, rest) = s.trim().split_once(':').ok_or_else(err)?;

        match op {
            "delete" if !rest.is_empty() => Ok(Self::delete(rest)),
            "insert" | "upsert" => {
                let (key, value) = rest.split_once('=').ok_or_else(err)?;
                if key.is_empty() {
                    return Err(err());
                }
                Ok(if op == "insert" {
                    Self::insert(key, value)
                } else {
                    Self::upsert(key, value)
                })
            }
            _ => Err(err()),
        }
    }
}

impl fmt::Display for AttributeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ActionKind::Insert(v) => write!(f, "insert:{}={v}", self.key),
            ActionKind::Upsert(v) => write!(f, "upsert:{}={v}", self.key),
            ActionKind::Delete => write!(f, "delete:{}", self.key),
        }
    }
}

/// A record whose attributes the enricher can edit.
pub trait Enrichable {
    /// Applies one action.
    fn apply(&mut self, action: &AttributeAction);

    /// Copies resource attributes into indexed labels. Spans have none.
    fn promote(&mut self, _resource: &Resource, _keys: &[String]) {}
}

fn apply_to_attributes(
    attributes: &mut crate::models::Attributes,
    action: &AttributeAction,
) {
    match &action.kind {
        ActionKind::Insert(value) => {
            attributes
                .entry(action.key.clone())
                .or_insert_with(|| value.clone());
        }
        ActionKind::Upsert(value) => {
            attributes.insert(action.key.clone(), value.clone());
        }
        ActionKind::Delete => {
            attributes.remove(&action.key);
        }
    }
}

impl Enrichable for Span {
    fn apply(&mut self, action: &AttributeAction) {
        apply_to_attributes(&mut self.attributes, action);
    }
}

impl Enrichable for LogRecord {
    fn apply(&mut self, action: &AttributeAction) {
        apply_to_attributes(&mut self.attributes, action);
    }

    fn promote(&mut self, resource: &Resource, keys: &[String]) {
        for key in keys {
            if let Some(value) = resource.attribute(key) {
                self.labels.insert(label_name(key), value);
            }
        }
    }
}

impl Enrichable for MetricPoint {
    fn apply(&mut self, action: &AttributeAction) {
        let key = label_name(&action.key);
        match &action.kind {
            ActionKind::Insert(value) => {
                self.labels.entry(key).or_insert_with(|| value.to_string());
            }
            ActionKind::Upsert(value) => {
                self.labels.insert(key, value.to_string());
            }
            ActionKind::Delete => {
                self.labels.remove(&key);
            }
        }
    }

    fn promote(&mut self, resource: &Resource, keys: &[String]) {
        for key in keys {
            if let Some(value) = resource.attribute(key) {
                self.labels.entry(label_name(key)).or_insert(value);
            }
        }
    }
}

/// Converts an attribute key to a label name.
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`, and a leading digit
/// gets a `_` prefix, so `service.name` maps to `service_name` and
/// `k8s.pod-name` to `k8s_pod_name`.
#[must_use]
pub fn label_name(key: &str) -> String {
    let mut label: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if label.starts_with(|c: char| c.is_ascii_digit()) {
        label.insert(0, '_');
    }
    label
}

/// The attribute enrichment stage.
#[derive(Debug, Clone)]
pub struct Enricher {
    actions: Vec<AttributeAction>,
    promoted: Vec<String>,
}

impl Default for Enricher {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
            promoted: DEFAULT_PROMOTED_LABELS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl Enricher {
    /// Creates an enricher with the given actions and promoted keys.
    #[must_use]
    pub fn new(actions: Vec<AttributeAction>, promoted: Vec<String>) -> Self {
        Self { actions, promoted }
    }

    /// Adds an action.
    #[must_use]
    pub fn with_action(mut self, action: AttributeAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Replaces the list of promoted resource attributes.
    #[must_use]
    pub fn with_promoted(mut self, keys: Vec<String>) -> Self {
        self.promoted = keys;
        self
    }

    /// Runs every action, then label promotion, on one record.
    pub fn enrich<T: Enrichable>(&self, record: &mut T, resource: &Resource) {
        for action in &self.actions {
            record.apply(action);
        }
        record.promote(resource, &self.promoted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Severity, TraceContext};

    #[test]
    fn test_insert_does_not_overwrite() {
        let mut span = Span::new(&TraceContext::new_root(), "GET /api/tasks")
            .with_attribute("tier", "frontend");

        Enricher::default()
            .with_action(AttributeAction::insert("tier", "backend"))
            .with_action(AttributeAction::insert("region", "eu"))
            .enrich(&mut span, &Resource::new("api"));

        assert_eq!(span.attributes["tier"], AttributeValue::from("frontend"));
        assert_eq!(span.attributes["region"], AttributeValue::from("eu"));
    }

    #[test]
    fn test_upsert_and_delete() {
        let mut log = LogRecord::new(Severity::Info, "hello")
            .with_attribute("tier", "frontend")
            .with_attribute("password", "hunter2");

        Enricher::default()
            .with_action(AttributeAction::upsert("tier", "backend"))
            .with_action(AttributeAction::delete("password"))
            .enrich(&mut log, &Resource::new("api"));

        assert_eq!(log.attributes["tier"], AttributeValue::from("backend"));
        assert!(!log.attributes.contains_key("password"));
    }

    #[test]
    fn test_default_promotion_to_log_labels() {
        let resource = Resource::new("flask-backend").with_environment("lab");
        let mut log = LogRecord::new(Severity::Info, "Request completed");

        Enricher::default().enrich(&mut log, &resource);

        assert_eq!(log.labels.get("service_name").map(String::as_str), Some("flask-backend"));
        assert_eq!(log.labels.get("deployment_environment").map(String::as_str), Some("lab"));
    }

    #[test]
    fn test_promotion_skips_missing_attributes() {
        let mut log = LogRecord::new(Severity::Info, "x");
        Enricher::default().enrich(&mut log, &Resource::new("api"));

        assert_eq!(log.labels.len(), 1);
        assert!(!log.labels.contains_key("deployment_environment"));
    }

    #[test]
    fn test_label_name_replaces_invalid_characters() {
        assert_eq!(label_name("service.name"), "service_name");
        assert_eq!(label_name("k8s.pod-name"), "k8s_pod_name");
        assert_eq!(label_name("team/owner email"), "team_owner_email");
        assert_eq!(label_name("2xx.count"), "_2xx_count");
        assert_eq!(label_name("already_valid"), "already_valid");
    }

    #[test]
    fn test_metric_actions_use_label_names() {
        let mut point = MetricPoint::counter("http_requests_total", 1.0);

        Enricher::default()
            .with_action(AttributeAction::insert("cluster.name", "lab"))
            .enrich(&mut point, &Resource::new("api"));

        assert_eq!(point.labels.get("cluster_name").map(String::as_str), Some("lab"));
    }

    #[test]
    fn test_metric_promotion_keeps_emitted_labels() {
        let mut point = MetricPoint::counter("http_requests_total", 1.0)
            .with_label("deployment_environment", "canary");

        Enricher::default().enrich(
            &mut point,
            &Resource::new("flask-backend").with_environment("lab"),
        );

        assert_eq!(point.labels.get("service_name").map(String::as_str), Some("flask-backend"));
        assert_eq!(
            point.labels.get("deployment_environment").map(String::as_str),
            Some("canary")
        );
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            "insert:env=lab".parse::<AttributeAction>(),
            Ok(AttributeAction::insert("env", "lab"))
        );
        assert_eq!(
            "upsert:a.b=".parse::<AttributeAction>(),
            Ok(AttributeAction::upsert("a.b", ""))
        );
        assert_eq!(
            "delete:secret".parse::<AttributeAction>(),
            Ok(AttributeAction::delete("secret"))
        );
        assert!("delete:".parse::<AttributeAction>().is_err());
        assert!("insert:noequals".parse::<AttributeAction>().is_err());
        assert!("rename:a=b".parse::<AttributeAction>().is_err());
    }

    #[test]
    fn test_action_display_round_trips() {
        let action = AttributeAction::upsert("tier", "backend");
        assert_eq!(action.to_string().parse::<AttributeAction>(), Ok(action));
    }
}
