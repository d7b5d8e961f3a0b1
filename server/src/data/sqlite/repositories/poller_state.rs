//! Poller resumption state repository
//!
//! Manages the single-row poller_state table that tracks the last processed
//! ingestion WAL key. A missing row and a row with a NULL key both mean
//! "start from the beginning"; the caller must treat them identically.

use sqlx::SqlitePool;

use crate::data::sqlite::SqliteError;

/// Get the last processed ingestion key, if any
pub async fn load(pool: &SqlitePool) -> Result<Option<Vec<u8>>, SqliteError> {
    let row: Option<(Option<Vec<u8>>,)> =
        sqlx::query_as("SELECT last_key FROM poller_state WHERE id = 1")
            .fetch_optional(pool)
            .await?;

    Ok(row.and_then(|(key,)| key))
}

/// Upsert the last processed ingestion key
pub async fn save(pool: &SqlitePool, last_key: &[u8]) -> Result<(), SqliteError> {
    sqlx::query(
        "INSERT INTO poller_state (id, last_key) VALUES (1, ?)
         ON CONFLICT(id) DO UPDATE SET last_key = excluded.last_key",
    )
    .bind(last_key.to_vec())
    .execute(pool)
    .await?;

    Ok(())
}

/// Clear the resume position (operator-driven replay from the beginning)
pub async fn clear(pool: &SqlitePool) -> Result<(), SqliteError> {
    sqlx::query("UPDATE poller_state SET last_key = NULL WHERE id = 1")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query(crate::data::sqlite::schema::SCHEMA)
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_load_fresh_database_returns_none() {
        let pool = setup_test_pool().await;
        let key = load(&pool).await.unwrap();
        assert!(key.is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let pool = setup_test_pool().await;

        save(&pool, b"\x01\x02\x03").await.unwrap();
        let key = load(&pool).await.unwrap();
        assert_eq!(key, Some(vec![0x01, 0x02, 0x03]));
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_key() {
        let pool = setup_test_pool().await;

        save(&pool, b"first").await.unwrap();
        save(&pool, b"second").await.unwrap();

        let key = load(&pool).await.unwrap();
        assert_eq!(key.as_deref(), Some(b"second".as_slice()));

        // Still a single row
        let count: i32 = sqlx::query_scalar("SELECT COUNT(*) FROM poller_state")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_clear_resets_to_none() {
        let pool = setup_test_pool().await;

        save(&pool, b"cursor").await.unwrap();
        clear(&pool).await.unwrap();

        // NULL key reads the same as a missing row
        let key = load(&pool).await.unwrap();
        assert!(key.is_none());
    }

    #[tokio::test]
    async fn test_clear_on_fresh_database_is_noop() {
        let pool = setup_test_pool().await;
        clear(&pool).await.unwrap();
        assert!(load(&pool).await.unwrap().is_none());
    }
}
