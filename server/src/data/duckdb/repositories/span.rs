//! DuckDB span repository
//!
//! Batch writes use INSERT OR IGNORE so redelivered batches are absorbed
//! without raising on the (trace_id, span_id) primary key. Transactional
//! framing is owned by the caller so a span batch and its derived state
//! patches commit atomically.
//!
//! Read helpers return spans ordered by start_time descending, parse the
//! stored JSON body columns, and bound `limit` to 1..=10000.

use chrono::DateTime;
use duckdb::{Connection, params};

use crate::core::constants::{QUERY_LIMIT_DEFAULT, QUERY_LIMIT_MAX};
use crate::data::duckdb::models::{parse_json_array, parse_json_object};
use crate::data::duckdb::sql_types::SqlTimestamp;
use crate::data::duckdb::{DuckdbError, SpanRecord, SpanRow};

const INSERT_SPAN: &str = "
    INSERT OR IGNORE INTO spans (
        trace_id, span_id, parent_span_id, service_name, name, kind,
        start_time, end_time, status_code, status_message,
        attributes_json, events_json, links_json,
        trace_flags, trace_state,
        junjo_id, junjo_parent_id, junjo_span_type,
        junjo_wf_state_start, junjo_wf_state_end,
        junjo_wf_graph_structure, junjo_wf_store_id
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const SELECT_SPAN_COLUMNS: &str = "
    trace_id, span_id, parent_span_id, service_name, name, kind,
    epoch_us(start_time), epoch_us(end_time), status_code, status_message,
    attributes_json, events_json, links_json,
    trace_flags, trace_state,
    junjo_id, junjo_parent_id, junjo_span_type,
    junjo_wf_state_start, junjo_wf_state_end,
    junjo_wf_graph_structure, junjo_wf_store_id";

/// Insert spans, ignoring rows whose primary key already exists.
///
/// Runs inside whatever transaction the caller has open; the poller wraps a
/// span batch and its patches in one transaction. Returns one flag per input
/// row telling whether it was newly inserted (false = duplicate, ignored),
/// so the caller can skip derived rows for redelivered spans.
pub fn insert_batch(conn: &Connection, spans: &[SpanRow]) -> Result<Vec<bool>, DuckdbError> {
    if spans.is_empty() {
        return Ok(Vec::new());
    }

    let mut inserted = Vec::with_capacity(spans.len());
    let mut stmt = conn.prepare(INSERT_SPAN)?;
    for span in spans {
        let changed = stmt.execute(params![
            span.trace_id.as_str(),
            span.span_id.as_str(),
            span.parent_span_id.as_deref(),
            span.service_name.as_str(),
            span.name.as_str(),
            span.kind.as_str(),
            SqlTimestamp(span.start_time),
            SqlTimestamp(span.end_time),
            span.status_code.as_str(),
            span.status_message.as_str(),
            span.attributes_json.as_str(),
            span.events_json.as_str(),
            span.links_json.as_str(),
            span.trace_flags as i64,
            span.trace_state.as_deref(),
            span.junjo_id.as_str(),
            span.junjo_parent_id.as_str(),
            span.junjo_span_type.as_str(),
            span.junjo_wf_state_start.as_str(),
            span.junjo_wf_state_end.as_str(),
            span.junjo_wf_graph_structure.as_str(),
            span.junjo_wf_store_id.as_str(),
        ])?;
        inserted.push(changed > 0);
    }

    Ok(inserted)
}

/// Validate a read-helper result limit, returning it as a bind value
fn validate_limit(limit: usize) -> Result<i64, DuckdbError> {
    if limit == 0 || limit > QUERY_LIMIT_MAX {
        return Err(DuckdbError::LimitOutOfRange {
            limit,
            max: QUERY_LIMIT_MAX,
        });
    }
    Ok(limit as i64)
}

/// Default result limit for callers that do not specify one
pub fn default_limit() -> usize {
    QUERY_LIMIT_DEFAULT
}

fn span_record_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<SpanRecord> {
    let start_us: i64 = row.get(6)?;
    let end_us: i64 = row.get(7)?;
    let attributes: Option<String> = row.get(10)?;
    let events: Option<String> = row.get(11)?;
    let links: Option<String> = row.get(12)?;
    let wf_state_start: Option<String> = row.get(18)?;
    let wf_state_end: Option<String> = row.get(19)?;
    let wf_graph: Option<String> = row.get(20)?;

    Ok(SpanRecord {
        trace_id: row.get(0)?,
        span_id: row.get(1)?,
        parent_span_id: row.get(2)?,
        service_name: row.get(3)?,
        name: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        kind: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        start_time: DateTime::from_timestamp_micros(start_us).unwrap_or(DateTime::UNIX_EPOCH),
        end_time: DateTime::from_timestamp_micros(end_us).unwrap_or(DateTime::UNIX_EPOCH),
        status_code: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        status_message: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        attributes: parse_json_object(attributes.as_deref().unwrap_or("{}")),
        events: parse_json_array(events.as_deref().unwrap_or("[]")),
        links: parse_json_array(links.as_deref().unwrap_or("[]")),
        trace_flags: row.get::<_, Option<i64>>(13)?.unwrap_or(0) as u32,
        trace_state: row.get(14)?,
        junjo_id: row.get::<_, Option<String>>(15)?.unwrap_or_default(),
        junjo_parent_id: row.get::<_, Option<String>>(16)?.unwrap_or_default(),
        junjo_span_type: row.get::<_, Option<String>>(17)?.unwrap_or_default(),
        junjo_wf_state_start: parse_json_object(wf_state_start.as_deref().unwrap_or("{}")),
        junjo_wf_state_end: parse_json_object(wf_state_end.as_deref().unwrap_or("{}")),
        junjo_wf_graph_structure: parse_json_object(wf_graph.as_deref().unwrap_or("{}")),
        junjo_wf_store_id: row.get::<_, Option<String>>(21)?.unwrap_or_default(),
    })
}

/// List all distinct service names, alphabetically
pub fn list_services(conn: &Connection) -> Result<Vec<String>, DuckdbError> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT service_name FROM spans ORDER BY service_name ASC")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.collect::<Result<Vec<String>, _>>()?)
}

/// List spans for a service, most recent first
pub fn list_service_spans(
    conn: &Connection,
    service_name: &str,
    limit: usize,
) -> Result<Vec<SpanRecord>, DuckdbError> {
    let limit = validate_limit(limit)?;
    let sql = format!(
        "SELECT {SELECT_SPAN_COLUMNS} FROM spans
         WHERE service_name = ?
         ORDER BY start_time DESC
         LIMIT ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![service_name, limit], |row| {
        span_record_from_row(row)
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// List root spans (no parent) for a service, most recent first.
///
/// With `llm_only`, restrict to traces containing at least one span whose
/// attributes carry `openinference.span.kind = "LLM"`.
pub fn list_root_spans(
    conn: &Connection,
    service_name: &str,
    limit: usize,
    llm_only: bool,
) -> Result<Vec<SpanRecord>, DuckdbError> {
    let limit = validate_limit(limit)?;
    let llm_filter = if llm_only {
        "AND trace_id IN (
             SELECT trace_id FROM spans
             WHERE json_extract_string(attributes_json, '$.\"openinference.span.kind\"') = 'LLM'
         )"
    } else {
        ""
    };
    let sql = format!(
        "SELECT {SELECT_SPAN_COLUMNS} FROM spans
         WHERE service_name = ?
           AND parent_span_id IS NULL
           {llm_filter}
         ORDER BY start_time DESC
         LIMIT ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![service_name, limit], |row| {
        span_record_from_row(row)
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// List workflow-type spans for a service, most recent first
pub fn list_workflow_spans(
    conn: &Connection,
    service_name: &str,
    limit: usize,
) -> Result<Vec<SpanRecord>, DuckdbError> {
    let limit = validate_limit(limit)?;
    let sql = format!(
        "SELECT {SELECT_SPAN_COLUMNS} FROM spans
         WHERE junjo_span_type = 'workflow'
           AND service_name = ?
         ORDER BY start_time DESC
         LIMIT ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![service_name, limit], |row| {
        span_record_from_row(row)
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// List all spans of a trace, most recent first
pub fn list_trace_spans(conn: &Connection, trace_id: &str) -> Result<Vec<SpanRecord>, DuckdbError> {
    let trace_id = trace_id.to_lowercase();
    let sql = format!(
        "SELECT {SELECT_SPAN_COLUMNS} FROM spans
         WHERE trace_id = ?
         ORDER BY start_time DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![trace_id], |row| span_record_from_row(row))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Get a single span by trace and span ID
pub fn get_span(
    conn: &Connection,
    trace_id: &str,
    span_id: &str,
) -> Result<Option<SpanRecord>, DuckdbError> {
    let trace_id = trace_id.to_lowercase();
    let span_id = span_id.to_lowercase();
    let sql = format!(
        "SELECT {SELECT_SPAN_COLUMNS} FROM spans
         WHERE trace_id = ? AND span_id = ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![trace_id, span_id], |row| span_record_from_row(row))?;
    match rows.next() {
        Some(record) => Ok(Some(record?)),
        None => Ok(None),
    }
}
