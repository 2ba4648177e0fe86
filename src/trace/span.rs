//! Per-hop span derived from the inbound trace header.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::context::{self, SpanId, TraceFlags, TraceId};

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Timestamped free-form log line attached to a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanLog {
    pub timestamp: u64,
    pub message: String,
}

/// JSON shape exchanged with collectors and relays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub operation_name: String,
    pub start_time: u64,
    #[serde(default)]
    pub end_time: Option<u64>,
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub tags: Map<String, Value>,
    #[serde(default)]
    pub logs: Vec<SpanLog>,
}

/// One unit of work performed by one hop.
///
/// The trace-id, parent and flags come from the inbound header; the span-id
/// is always fresh. The span is owned by the handler that created it and is
/// consumed by the reporter.
#[derive(Debug, Clone)]
pub struct Span {
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    operation_name: String,
    start_time: u64,
    end_time: Option<u64>,
    flags: TraceFlags,
    tags: Map<String, Value>,
    logs: Vec<SpanLog>,
}

impl Span {
    /// Start a span for `operation_name` from an optional `traceparent`.
    pub fn create(operation_name: impl Into<String>, traceparent: Option<&str>) -> Self {
        let inbound = context::parse(traceparent);
        Self {
            trace_id: inbound.trace_id,
            span_id: SpanId::random(),
            parent_span_id: inbound.parent_span_id,
            operation_name: operation_name.into(),
            start_time: now_millis(),
            end_time: None,
            flags: inbound.flags,
            tags: Map::new(),
            logs: Vec::new(),
        }
    }

    /// Stamp the end time. A second call overwrites the first.
    pub fn complete(&mut self) {
        self.end_time = Some(now_millis());
    }

    pub fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }

    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn end_time(&self) -> Option<u64> {
        self.end_time
    }

    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn add_log(&mut self, message: impl Into<String>) {
        self.logs.push(SpanLog {
            timestamp: now_millis(),
            message: message.into(),
        });
    }

    /// Header to send to the next hop: same trace and flags, this span as parent.
    pub fn traceparent(&self) -> String {
        context::format(self.trace_id, self.span_id, self.flags)
    }

    pub fn to_wire(&self) -> SpanRecord {
        SpanRecord {
            trace_id: self.trace_id.to_string(),
            span_id: self.span_id.to_string(),
            parent_span_id: self.parent_span_id.map(|id| id.to_string()),
            operation_name: self.operation_name.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            flag: Some(self.flags.to_string()),
            tags: self.tags.clone(),
            logs: self.logs.clone(),
        }
    }
}
