//! DuckDB schema definitions
//!
//! Primary keys on both tables make batch inserts idempotent: the write path
//! uses INSERT OR IGNORE, so redelivered batches collapse to no-ops.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
-- Infrastructure: Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at BIGINT NOT NULL,
    description VARCHAR
);

-- ═══════════════════════════════════════════════════════════════════════════════
-- Spans: one row per ingested OTEL span, keyed by (trace_id, span_id)
-- ═══════════════════════════════════════════════════════════════════════════════
CREATE TABLE IF NOT EXISTS spans (
    -- IDENTITY
    trace_id            VARCHAR NOT NULL,   -- OTEL trace ID (32-char lowercase hex)
    span_id             VARCHAR NOT NULL,   -- OTEL span ID (16-char lowercase hex)
    parent_span_id      VARCHAR,            -- Parent span (NULL = root)
    service_name        VARCHAR NOT NULL,   -- From resource service.name

    -- SPAN METADATA
    name                VARCHAR,
    kind                VARCHAR,            -- UNSPECIFIED/INTERNAL/SERVER/CLIENT/PRODUCER/CONSUMER
    start_time          TIMESTAMPTZ NOT NULL,
    end_time            TIMESTAMPTZ NOT NULL,
    status_code         VARCHAR,            -- Numeric OTEL status code, stringified
    status_message      VARCHAR,

    -- OPAQUE JSON BODIES (stored as strings; parsed by the read helpers)
    attributes_json     VARCHAR,            -- JSON object
    events_json         VARCHAR,            -- JSON array
    links_json          VARCHAR,            -- JSON array (currently always [])

    -- TRACE CONTEXT
    trace_flags         INTEGER,
    trace_state         VARCHAR,

    -- JUNJO DOMAIN FIELDS
    junjo_id            VARCHAR,
    junjo_parent_id     VARCHAR,
    junjo_span_type     VARCHAR,            -- workflow, subflow, node, or empty

    -- WORKFLOW STATE (workflow/subflow spans only; {} otherwise)
    junjo_wf_state_start     VARCHAR,
    junjo_wf_state_end       VARCHAR,
    junjo_wf_graph_structure VARCHAR,
    junjo_wf_store_id        VARCHAR,

    PRIMARY KEY (trace_id, span_id)
);

CREATE INDEX IF NOT EXISTS idx_spans_service_start ON spans(service_name, start_time);
CREATE INDEX IF NOT EXISTS idx_spans_span_type ON spans(junjo_span_type);

-- ═══════════════════════════════════════════════════════════════════════════════
-- State patches: one row per "set_state" event on an ingested span
-- ═══════════════════════════════════════════════════════════════════════════════
CREATE TABLE IF NOT EXISTS state_patches (
    patch_id        VARCHAR PRIMARY KEY,    -- Fresh UUID per insert
    service_name    VARCHAR NOT NULL,
    trace_id        VARCHAR NOT NULL,       -- References spans(trace_id, span_id)
    span_id         VARCHAR NOT NULL,
    workflow_id     VARCHAR,                -- junjo.id of the enclosing workflow span
    node_id         VARCHAR,                -- junjo.id of the enclosing node span
    event_time      TIMESTAMPTZ NOT NULL,
    patch_json      VARCHAR,                -- JSON object (stored as string)
    patch_store_id  VARCHAR
);

CREATE INDEX IF NOT EXISTS idx_state_patches_span ON state_patches(trace_id, span_id);
"#;
