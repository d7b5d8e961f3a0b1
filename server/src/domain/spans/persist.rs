//! Batch persistence
//!
//! Writes a decoded span batch and its derived state patches in one DuckDB
//! transaction. Spans insert with upsert-ignore semantics; patches are only
//! derived from spans that were newly inserted, so a redelivered batch
//! collapses to a no-op for both tables.

use std::collections::HashSet;
use std::sync::Arc;

use crate::data::duckdb::{
    DuckdbError, DuckdbService, SpanRow, StatePatchRow, in_transaction, patch_repository,
    span_repository,
};

/// Persist one batch atomically. Returns the number of newly inserted spans.
pub async fn persist_batch(
    analytics: &Arc<DuckdbService>,
    spans: Vec<SpanRow>,
    patches: Vec<StatePatchRow>,
) -> Result<usize, DuckdbError> {
    if spans.is_empty() {
        return Ok(0);
    }

    analytics
        .with_conn(move |conn| {
            in_transaction(conn, |conn| {
                let inserted = span_repository::insert_batch(conn, &spans)?;

                let fresh_keys: HashSet<(&str, &str)> = spans
                    .iter()
                    .zip(&inserted)
                    .filter(|(_, was_inserted)| **was_inserted)
                    .map(|(span, _)| (span.trace_id.as_str(), span.span_id.as_str()))
                    .collect();

                let fresh_patches: Vec<StatePatchRow> = patches
                    .iter()
                    .filter(|patch| {
                        fresh_keys.contains(&(patch.trace_id.as_str(), patch.span_id.as_str()))
                    })
                    .cloned()
                    .collect();
                patch_repository::insert_batch(conn, &fresh_patches)?;

                Ok(fresh_keys.len())
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::AppStorage;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    async fn create_test_service() -> (TempDir, Arc<DuckdbService>) {
        let temp_dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(temp_dir.path().join("duckdb"))
            .await
            .unwrap();
        let storage = AppStorage::init_for_test(temp_dir.path().to_path_buf());
        let service = Arc::new(DuckdbService::init(&storage).await.unwrap());
        (temp_dir, service)
    }

    fn make_span(trace_id: &str, span_id: &str) -> SpanRow {
        SpanRow {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            service_name: "svc".to_string(),
            start_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap(),
            ..Default::default()
        }
    }

    fn make_patch(trace_id: &str, span_id: &str) -> StatePatchRow {
        StatePatchRow {
            patch_id: uuid::Uuid::new_v4().to_string(),
            service_name: "svc".to_string(),
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            workflow_id: String::new(),
            node_id: String::new(),
            event_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            patch_json: "{}".to_string(),
            patch_store_id: String::new(),
        }
    }

    #[tokio::test]
    async fn test_persist_empty_batch() {
        let (_tmp, analytics) = create_test_service().await;
        let inserted = persist_batch(&analytics, vec![], vec![]).await.unwrap();
        assert_eq!(inserted, 0);
    }

    #[tokio::test]
    async fn test_persist_spans_and_patches() {
        let (_tmp, analytics) = create_test_service().await;

        let inserted = persist_batch(
            &analytics,
            vec![make_span("aa", "01"), make_span("aa", "02")],
            vec![make_patch("aa", "01")],
        )
        .await
        .unwrap();
        assert_eq!(inserted, 2);

        let conn = analytics.conn();
        let spans: i64 = conn
            .query_row("SELECT COUNT(*) FROM spans", [], |row| row.get(0))
            .unwrap();
        let patches: i64 = conn
            .query_row("SELECT COUNT(*) FROM state_patches", [], |row| row.get(0))
            .unwrap();
        assert_eq!(spans, 2);
        assert_eq!(patches, 1);
    }

    #[tokio::test]
    async fn test_redelivered_batch_is_absorbed() {
        let (_tmp, analytics) = create_test_service().await;

        let spans = vec![make_span("aa", "01")];
        let first = persist_batch(&analytics, spans.clone(), vec![make_patch("aa", "01")])
            .await
            .unwrap();
        assert_eq!(first, 1);

        // Same batch again: fresh patch ids, but nothing may duplicate
        let second = persist_batch(&analytics, spans, vec![make_patch("aa", "01")])
            .await
            .unwrap();
        assert_eq!(second, 0);

        let conn = analytics.conn();
        let spans: i64 = conn
            .query_row("SELECT COUNT(*) FROM spans", [], |row| row.get(0))
            .unwrap();
        let patches: i64 = conn
            .query_row("SELECT COUNT(*) FROM state_patches", [], |row| row.get(0))
            .unwrap();
        assert_eq!(spans, 1);
        assert_eq!(patches, 1);
    }
}
