//! Active spans.

use super::Telemetry;
use crate::models::{
    AttributeValue, Attributes, Envelope, Severity, Span, SpanEvent, SpanKind, SpanStatus,
    TraceContext,
};
use chrono::Utc;

/// An open span, owned by the code doing the work.
///
/// The span is sealed and handed to the export buffer when the handle is
/// ended or dropped, whichever comes first, so early returns and panics still
/// close it. Spans of unsampled traces are sealed but never exported.
#[derive(Debug)]
pub struct SpanHandle {
    span: Option<Span>,
    sampled: bool,
    telemetry: Telemetry,
}

impl SpanHandle {
    pub(super) fn start(telemetry: Telemetry, ctx: TraceContext, name: String, kind: SpanKind) -> Self {
        let span = Span::new(&ctx, name).with_kind(kind);
        Self {
            span: Some(span),
            sampled: ctx.sampled,
            telemetry,
        }
    }

    /// The context children of this span should use.
    #[must_use]
    pub fn context(&self) -> TraceContext {
        match &self.span {
            Some(span) => TraceContext {
                trace_id: span.trace_id,
                span_id: span.span_id,
                parent_span_id: span.parent_span_id,
                sampled: self.sampled,
            },
            None => TraceContext::new_root(),
        }
    }

    /// Sets an attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        if let Some(span) = &mut self.span {
            span.attributes.insert(key.into(), value.into());
        }
    }

    /// Appends a timestamped event.
    pub fn add_event(&mut self, name: impl Into<String>, attributes: Attributes) {
        if let Some(span) = &mut self.span {
            span.events.push(SpanEvent {
                name: name.into(),
                timestamp: Utc::now(),
                attributes,
            });
        }
    }

    /// Sets the final status.
    pub fn set_status(&mut self, status: SpanStatus) {
        if let Some(span) = &mut self.span {
            span.status = status;
        }
    }

    /// Marks the span as failed and records an `exception` event.
    pub fn record_error(&mut self, description: impl Into<String>) {
        let description = description.into();
        self.add_event(
            "exception",
            Attributes::from([(
                "exception.message".to_string(),
                AttributeValue::String(description.clone()),
            )]),
        );
        self.set_status(SpanStatus::error(description));
    }

    /// Emits a log record correlated with this span.
    pub fn log(&self, severity: Severity, message: impl Into<String>, attributes: Attributes) {
        self.telemetry
            .emit_log(severity, message, attributes, Some(&self.context()));
    }

    /// Returns true if the span will be exported.
    #[must_use]
    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// Seals the span now.
    pub fn end(mut self) {
        self.seal();
    }

    fn seal(&mut self) {
        let Some(mut span) = self.span.take() else {
            return;
        };

        span.end_time = Utc::now().max(span.start_time);
        if self.sampled {
            self.telemetry
                .inner
                .spans
                .emit(Envelope::new(self.telemetry.resource().clone(), span));
        }
    }
}

impl Drop for SpanHandle {
    fn drop(&mut self) {
        self.seal();
    }
}
