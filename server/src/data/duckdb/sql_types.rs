//! SQL type wrappers for DuckDB
//!
//! Shared type wrappers for converting Rust types to DuckDB-compatible SQL values.

use chrono::{DateTime, Utc};
use duckdb::ToSql;
use duckdb::types::{ToSqlOutput, Value};

/// Wrapper for DateTime<Utc> to implement ToSql for DuckDB TIMESTAMPTZ
///
/// Formats with an explicit +00 offset so the stored instant does not depend
/// on the session timezone.
pub struct SqlTimestamp(pub DateTime<Utc>);

impl ToSql for SqlTimestamp {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        let ts = self.0.format("%Y-%m-%d %H:%M:%S%.6f+00").to_string();
        Ok(ToSqlOutput::Owned(Value::Text(ts)))
    }
}
