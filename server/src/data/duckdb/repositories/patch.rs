//! DuckDB state-patch repository
//!
//! Patches are written in the same caller-managed transaction as their
//! enclosing span batch. Each patch carries a fresh UUID primary key, so the
//! OR IGNORE clause only guards a retried statement; redelivery is absorbed
//! upstream by only deriving patches from spans that were newly inserted.

use duckdb::{Connection, params};

use crate::data::duckdb::sql_types::SqlTimestamp;
use crate::data::duckdb::{DuckdbError, StatePatchRow};

const INSERT_PATCH: &str = "
    INSERT OR IGNORE INTO state_patches (
        patch_id, service_name, trace_id, span_id,
        workflow_id, node_id, event_time,
        patch_json, patch_store_id
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// Insert state patches inside the caller's transaction
pub fn insert_batch(conn: &Connection, patches: &[StatePatchRow]) -> Result<(), DuckdbError> {
    if patches.is_empty() {
        return Ok(());
    }

    let mut stmt = conn.prepare(INSERT_PATCH)?;
    for patch in patches {
        stmt.execute(params![
            patch.patch_id.as_str(),
            patch.service_name.as_str(),
            patch.trace_id.as_str(),
            patch.span_id.as_str(),
            patch.workflow_id.as_str(),
            patch.node_id.as_str(),
            SqlTimestamp(patch.event_time),
            patch.patch_json.as_str(),
            patch.patch_store_id.as_str(),
        ])?;
    }

    Ok(())
}

/// Count patches recorded for a span
pub fn count_span_patches(
    conn: &Connection,
    trace_id: &str,
    span_id: &str,
) -> Result<i64, DuckdbError> {
    let trace_id = trace_id.to_lowercase();
    let span_id = span_id.to_lowercase();
    let count = conn.query_row(
        "SELECT COUNT(*) FROM state_patches WHERE trace_id = ? AND span_id = ?",
        params![trace_id, span_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::AppStorage;
    use crate::data::duckdb::DuckdbService;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    async fn create_test_service() -> (TempDir, DuckdbService) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let duckdb_dir = temp_dir.path().join("duckdb");
        tokio::fs::create_dir_all(&duckdb_dir)
            .await
            .expect("Failed to create duckdb dir");
        let storage = AppStorage::init_for_test(temp_dir.path().to_path_buf());
        let service = DuckdbService::init(&storage)
            .await
            .expect("Failed to init analytics service");
        (temp_dir, service)
    }

    fn make_patch(trace_id: &str, span_id: &str) -> StatePatchRow {
        StatePatchRow {
            patch_id: uuid::Uuid::new_v4().to_string(),
            service_name: "test-service".to_string(),
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            workflow_id: "wf-1".to_string(),
            node_id: String::new(),
            event_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            patch_json: r#"{"op":"replace","path":"/counter","value":1}"#.to_string(),
            patch_store_id: "store-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_empty_batch() {
        let (_temp_dir, analytics) = create_test_service().await;

        let conn = analytics.conn();
        assert!(insert_batch(&conn, &[]).is_ok());
    }

    #[tokio::test]
    async fn test_insert_and_count() {
        let (_temp_dir, analytics) = create_test_service().await;

        let conn = analytics.conn();
        insert_batch(
            &conn,
            &[make_patch("aa11", "bb22"), make_patch("aa11", "bb22")],
        )
        .unwrap();

        assert_eq!(count_span_patches(&conn, "aa11", "bb22").unwrap(), 2);
        assert_eq!(count_span_patches(&conn, "aa11", "cc33").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_patch_id_ignored() {
        let (_temp_dir, analytics) = create_test_service().await;

        let patch = make_patch("aa11", "bb22");
        let conn = analytics.conn();
        insert_batch(&conn, &[patch.clone()]).unwrap();
        insert_batch(&conn, &[patch]).unwrap();

        assert_eq!(count_span_patches(&conn, "aa11", "bb22").unwrap(), 1);
    }
}
