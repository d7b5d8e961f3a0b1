//! Data layer: storage services and repositories
//!
//! Two stores with distinct roles:
//! - SQLite: transactional row store (poller resumption state, API keys)
//! - DuckDB: analytical columnar store (spans, state patches)

pub mod duckdb;
pub mod sqlite;

pub use duckdb::{DuckdbError, DuckdbService, SpanRecord, SpanRow, StatePatchRow};
pub use sqlite::{SqliteError, SqliteService};
