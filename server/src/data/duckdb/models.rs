//! DuckDB data models for spans and state patches
//!
//! Write models carry the opaque JSON bodies as raw strings so the insert
//! path stays portable across storage engines; the read model parses them
//! back into structured values so callers get a uniform API.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A span ready for insertion, keyed by (trace_id, span_id)
#[derive(Debug, Clone)]
pub struct SpanRow {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub service_name: String,
    pub name: String,
    pub kind: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status_code: String,
    pub status_message: String,
    /// JSON object
    pub attributes_json: String,
    /// JSON array
    pub events_json: String,
    /// JSON array (always `[]` until links are supported)
    pub links_json: String,
    pub trace_flags: u32,
    pub trace_state: Option<String>,
    pub junjo_id: String,
    pub junjo_parent_id: String,
    pub junjo_span_type: String,
    /// JSON object; `{}` for non-workflow spans
    pub junjo_wf_state_start: String,
    pub junjo_wf_state_end: String,
    pub junjo_wf_graph_structure: String,
    pub junjo_wf_store_id: String,
}

impl Default for SpanRow {
    fn default() -> Self {
        Self {
            trace_id: String::new(),
            span_id: String::new(),
            parent_span_id: None,
            service_name: String::new(),
            name: String::new(),
            kind: "UNSPECIFIED".to_string(),
            start_time: DateTime::UNIX_EPOCH,
            end_time: DateTime::UNIX_EPOCH,
            status_code: String::new(),
            status_message: String::new(),
            attributes_json: "{}".to_string(),
            events_json: "[]".to_string(),
            links_json: "[]".to_string(),
            trace_flags: 0,
            trace_state: None,
            junjo_id: String::new(),
            junjo_parent_id: String::new(),
            junjo_span_type: String::new(),
            junjo_wf_state_start: "{}".to_string(),
            junjo_wf_state_end: "{}".to_string(),
            junjo_wf_graph_structure: "{}".to_string(),
            junjo_wf_store_id: String::new(),
        }
    }
}

/// A workflow state change carried as a "set_state" event on a span
#[derive(Debug, Clone)]
pub struct StatePatchRow {
    /// Fresh UUID per insert
    pub patch_id: String,
    pub service_name: String,
    pub trace_id: String,
    pub span_id: String,
    /// junjo.id of the enclosing span when its type is workflow, else empty
    pub workflow_id: String,
    /// junjo.id of the enclosing span when its type is node, else empty
    pub node_id: String,
    pub event_time: DateTime<Utc>,
    /// JSON object
    pub patch_json: String,
    pub patch_store_id: String,
}

/// A span as returned by the read helpers, JSON bodies parsed
#[derive(Debug, Clone, Serialize)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub service_name: String,
    pub name: String,
    pub kind: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status_code: String,
    pub status_message: String,
    pub attributes: JsonValue,
    pub events: JsonValue,
    pub links: JsonValue,
    pub trace_flags: u32,
    pub trace_state: Option<String>,
    pub junjo_id: String,
    pub junjo_parent_id: String,
    pub junjo_span_type: String,
    pub junjo_wf_state_start: JsonValue,
    pub junjo_wf_state_end: JsonValue,
    pub junjo_wf_graph_structure: JsonValue,
    pub junjo_wf_store_id: String,
}

/// Parse a stored JSON object column, falling back to an empty object
pub(crate) fn parse_json_object(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Stored JSON object column failed to parse");
        JsonValue::Object(serde_json::Map::new())
    })
}

/// Parse a stored JSON array column, falling back to an empty array
pub(crate) fn parse_json_array(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Stored JSON array column failed to parse");
        JsonValue::Array(Vec::new())
    })
}
