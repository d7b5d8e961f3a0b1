//! OTLP span decoding
//!
//! Pure conversion from an OTLP `Span` (plus the owning service name) into a
//! `SpanRow` and the `StatePatchRow`s carried by its events. Handles all six
//! protobuf attribute variants, nanosecond-to-microsecond timestamp
//! normalization, junjo attribute extraction, and dedicated-column filtering.

use chrono::{DateTime, Utc};
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use opentelemetry_proto::tonic::trace::v1::{Span, span};
use serde_json::{Map as JsonMap, Value as JsonValue};
use uuid::Uuid;

use crate::data::duckdb::{SpanRow, StatePatchRow};

/// Attributes stored in dedicated columns, filtered from attributes_json.
/// The first two are legacy keys: filtered for compatibility, never extracted.
const DEDICATED_COLUMN_KEYS: [&str; 9] = [
    "junjo.workflow_id",
    "node.id",
    "junjo.id",
    "junjo.parent_id",
    "junjo.span_type",
    "junjo.workflow.state.start",
    "junjo.workflow.state.end",
    "junjo.workflow.graph_structure",
    "junjo.workflow.store.id",
];

/// Event name that carries a workflow state patch
const SET_STATE_EVENT: &str = "set_state";

/// Convert an OTLP span kind to its enumerant name.
/// Unknown values map to UNSPECIFIED.
pub fn convert_kind(kind: i32) -> &'static str {
    match span::SpanKind::try_from(kind) {
        Ok(span::SpanKind::Unspecified) | Err(_) => "UNSPECIFIED",
        Ok(span::SpanKind::Internal) => "INTERNAL",
        Ok(span::SpanKind::Server) => "SERVER",
        Ok(span::SpanKind::Client) => "CLIENT",
        Ok(span::SpanKind::Producer) => "PRODUCER",
        Ok(span::SpanKind::Consumer) => "CONSUMER",
    }
}

/// Convert OTLP unix nanoseconds to a UTC wall-clock value.
///
/// Truncates to microsecond precision; losing the final three decimal digits
/// is accepted, the columnar store only holds microseconds.
pub fn timestamp_from_unix_nanos(nanos: u64) -> DateTime<Utc> {
    let micros = (nanos / 1_000) as i64;
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::UNIX_EPOCH)
}

/// A parent span id of zero or empty bytes marks a root span
fn decode_parent_span_id(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() || bytes.iter().all(|b| *b == 0) {
        return None;
    }
    Some(hex::encode(bytes))
}

/// Extract a string-valued attribute by key, empty string when absent
fn extract_string_attribute(attributes: &[KeyValue], key: &str) -> String {
    attributes
        .iter()
        .find_map(|attr| match (&attr.key, &attr.value) {
            (k, Some(AnyValue { value: Some(any_value::Value::StringValue(s)) })) if k == key => {
                Some(s.clone())
            }
            _ => None,
        })
        .unwrap_or_default()
}

/// Extract a JSON-carrying string attribute by key, `{}` when absent
fn extract_json_attribute(attributes: &[KeyValue], key: &str) -> String {
    let value = extract_string_attribute(attributes, key);
    if value.is_empty() { "{}".to_string() } else { value }
}

/// Convert a primitive AnyValue to JSON; None for nested or missing variants
fn primitive_to_json(value: &AnyValue) -> Option<JsonValue> {
    match &value.value {
        Some(any_value::Value::StringValue(s)) => Some(JsonValue::from(s.clone())),
        Some(any_value::Value::IntValue(i)) => Some(JsonValue::from(*i)),
        Some(any_value::Value::DoubleValue(d)) => Some(serde_json::json!(d)),
        Some(any_value::Value::BoolValue(b)) => Some(JsonValue::from(*b)),
        _ => None,
    }
}

/// Convert an OTLP AnyValue to JSON.
///
/// All six variants are handled: string, int, double, bool, array, kvlist,
/// plus bytes (hex-encoded). Arrays and kvlists only support primitive
/// elements; anything nested is dropped with a warning. A missing variant is
/// logged, never silently coerced.
fn any_value_to_json(value: &AnyValue) -> Option<JsonValue> {
    match &value.value {
        Some(any_value::Value::StringValue(_))
        | Some(any_value::Value::IntValue(_))
        | Some(any_value::Value::DoubleValue(_))
        | Some(any_value::Value::BoolValue(_)) => primitive_to_json(value),
        Some(any_value::Value::ArrayValue(arr)) => {
            let mut items = Vec::with_capacity(arr.values.len());
            for item in &arr.values {
                match primitive_to_json(item) {
                    Some(v) => items.push(v),
                    None => tracing::warn!("Unsupported array element type, dropping"),
                }
            }
            Some(JsonValue::Array(items))
        }
        Some(any_value::Value::KvlistValue(kvlist)) => {
            let mut map = JsonMap::new();
            for kv in &kvlist.values {
                match kv.value.as_ref().and_then(primitive_to_json) {
                    Some(v) => {
                        map.insert(kv.key.clone(), v);
                    }
                    None => tracing::warn!(key = %kv.key, "Unsupported kvlist element type, dropping"),
                }
            }
            Some(JsonValue::Object(map))
        }
        Some(any_value::Value::BytesValue(b)) => Some(JsonValue::from(hex::encode(b))),
        None => {
            tracing::warn!("Attribute value has no variant, dropping");
            None
        }
    }
}

/// Serialize attributes to a JSON object string
fn attributes_to_json(attributes: &[KeyValue]) -> String {
    let mut map = JsonMap::new();
    for attr in attributes {
        if let Some(value) = attr.value.as_ref().and_then(any_value_to_json) {
            map.insert(attr.key.clone(), value);
        }
    }
    JsonValue::Object(map).to_string()
}

/// Serialize span events to a JSON array string
fn events_to_json(events: &[span::Event]) -> String {
    let list: Vec<JsonValue> = events
        .iter()
        .map(|event| {
            let mut attrs = JsonMap::new();
            for attr in &event.attributes {
                if let Some(value) = attr.value.as_ref().and_then(any_value_to_json) {
                    attrs.insert(attr.key.clone(), value);
                }
            }
            serde_json::json!({
                "name": event.name,
                "timeUnixNano": event.time_unix_nano,
                "droppedAttributesCount": event.dropped_attributes_count,
                "attributes": JsonValue::Object(attrs),
            })
        })
        .collect();
    JsonValue::Array(list).to_string()
}

/// Extract state patches from "set_state" events
fn extract_patches(
    span: &Span,
    trace_id: &str,
    span_id: &str,
    workflow_id: &str,
    node_id: &str,
    service_name: &str,
) -> Vec<StatePatchRow> {
    span.events
        .iter()
        .filter(|event| event.name == SET_STATE_EVENT)
        .map(|event| StatePatchRow {
            patch_id: Uuid::new_v4().to_string(),
            service_name: service_name.to_string(),
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            workflow_id: workflow_id.to_string(),
            node_id: node_id.to_string(),
            event_time: timestamp_from_unix_nanos(event.time_unix_nano),
            patch_json: extract_json_attribute(&event.attributes, "junjo.state_json_patch"),
            patch_store_id: extract_string_attribute(&event.attributes, "junjo.store.id"),
        })
        .collect()
}

/// Decode one OTLP span into a storable row plus its state patches.
///
/// Absent domain attributes yield defaults; nothing here aborts the span.
pub fn decode_span(service_name: &str, span: &Span) -> (SpanRow, Vec<StatePatchRow>) {
    let trace_id = hex::encode(&span.trace_id);
    let span_id = hex::encode(&span.span_id);
    let parent_span_id = decode_parent_span_id(&span.parent_span_id);

    let start_time = timestamp_from_unix_nanos(span.start_time_unix_nano);
    let end_time = timestamp_from_unix_nanos(span.end_time_unix_nano);

    let (status_code, status_message) = match &span.status {
        Some(status) => (status.code.to_string(), status.message.clone()),
        None => (String::new(), String::new()),
    };

    let junjo_span_type = extract_string_attribute(&span.attributes, "junjo.span_type");
    let junjo_parent_id = extract_string_attribute(&span.attributes, "junjo.parent_id");
    let junjo_id = extract_string_attribute(&span.attributes, "junjo.id");

    let workflow_id = if junjo_span_type == "workflow" {
        junjo_id.clone()
    } else {
        String::new()
    };
    let node_id = if junjo_span_type == "node" {
        junjo_id.clone()
    } else {
        String::new()
    };

    // Workflow state attributes only exist on workflow/subflow spans; other
    // spans keep literal {} so the schema stays stable for queries.
    let is_workflow = matches!(junjo_span_type.as_str(), "workflow" | "subflow");
    let (wf_state_start, wf_state_end, wf_graph_structure, wf_store_id) = if is_workflow {
        (
            extract_json_attribute(&span.attributes, "junjo.workflow.state.start"),
            extract_json_attribute(&span.attributes, "junjo.workflow.state.end"),
            extract_json_attribute(&span.attributes, "junjo.workflow.graph_structure"),
            extract_string_attribute(&span.attributes, "junjo.workflow.store.id"),
        )
    } else {
        (
            "{}".to_string(),
            "{}".to_string(),
            "{}".to_string(),
            String::new(),
        )
    };

    let filtered: Vec<KeyValue> = span
        .attributes
        .iter()
        .filter(|attr| !DEDICATED_COLUMN_KEYS.contains(&attr.key.as_str()))
        .cloned()
        .collect();

    let patches = extract_patches(
        span,
        &trace_id,
        &span_id,
        &workflow_id,
        &node_id,
        service_name,
    );

    let row = SpanRow {
        trace_id,
        span_id,
        parent_span_id,
        service_name: service_name.to_string(),
        name: span.name.clone(),
        kind: convert_kind(span.kind).to_string(),
        start_time,
        end_time,
        status_code,
        status_message,
        attributes_json: attributes_to_json(&filtered),
        events_json: events_to_json(&span.events),
        // Links are deliberately discarded; the column is a placeholder
        links_json: "[]".to_string(),
        trace_flags: span.flags,
        trace_state: if span.trace_state.is_empty() {
            None
        } else {
            Some(span.trace_state.clone())
        },
        junjo_id,
        junjo_parent_id,
        junjo_span_type,
        junjo_wf_state_start: wf_state_start,
        junjo_wf_state_end: wf_state_end,
        junjo_wf_graph_structure: wf_graph_structure,
        junjo_wf_store_id: wf_store_id,
    };

    (row, patches)
}
