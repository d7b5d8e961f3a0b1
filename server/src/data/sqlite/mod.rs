//! SQLite row store
//!
//! The transactional side of the pipeline: two small relations, the poller
//! resume cursor and the producer API keys. WAL journaling with NORMAL
//! synchronous lets the auth gRPC handlers look up keys while the poller
//! commits its cursor; writes are tiny but steady, so a background task
//! folds the WAL back into the main file on a fixed period.

pub mod error;
mod migrations;
pub mod repositories;
pub mod schema;

pub use error::SqliteError;
pub use sqlx::SqlitePool;

use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::constants::{
    SQLITE_BUSY_TIMEOUT_SECS, SQLITE_CHECKPOINT_INTERVAL_SECS, SQLITE_DB_FILENAME,
    SQLITE_MAX_CONNECTIONS,
};
use crate::core::storage::{AppStorage, DataSubdir};

/// Pooled SQLite handle shared by the poller and the auth gRPC handlers.
pub struct SqliteService {
    pool: SqlitePool,
}

impl SqliteService {
    /// Open the database (creating the file if needed) and bring the schema
    /// current. The busy timeout covers the rare overlap of a cursor write
    /// with a key lookup landing on the same WAL frame.
    pub async fn init(storage: &AppStorage) -> Result<Self, SqliteError> {
        let db_path = storage.subdir(DataSubdir::Sqlite).join(SQLITE_DB_FILENAME);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(SQLITE_BUSY_TIMEOUT_SECS));

        let pool = SqlitePoolOptions::new()
            .max_connections(SQLITE_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;

        tracing::debug!(path = %db_path.display(), "SQLite row store opened");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wrap an existing pool (test utility only)
    #[cfg(test)]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fold the WAL back into the main database file
    pub async fn checkpoint(&self) -> Result<(), SqliteError> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drain and close the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Truncate the WAL on a fixed period until the shutdown signal fires.
    pub fn start_checkpoint_task(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let db = Arc::clone(self);
        tokio::spawn(async move {
            let period = Duration::from_secs(SQLITE_CHECKPOINT_INTERVAL_SECS);
            loop {
                // Ok means the signal fired (or its sender is gone); Err is
                // just the period elapsing.
                let timed_out = tokio::time::timeout(period, shutdown_rx.wait_for(|&stop| stop))
                    .await
                    .is_err();
                if !timed_out {
                    break;
                }
                if let Err(e) = db.checkpoint().await {
                    tracing::warn!(error = %e, "Periodic WAL checkpoint failed");
                }
            }
            tracing::debug!("SQLite checkpoint task stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_test_store() -> (TempDir, SqliteService) {
        let temp_dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(temp_dir.path().join("sqlite"))
            .await
            .unwrap();
        let storage = AppStorage::init_for_test(temp_dir.path().to_path_buf());
        let service = SqliteService::init(&storage).await.unwrap();
        (temp_dir, service)
    }

    #[tokio::test]
    async fn test_init_applies_schema() {
        let (_tmp, store) = open_test_store().await;

        let version: i32 = sqlx::query_scalar("SELECT version FROM schema_version WHERE id = 1")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_checkpoint() {
        let (_tmp, store) = open_test_store().await;
        store.checkpoint().await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_existing_database() {
        let (_tmp, store) = open_test_store().await;

        sqlx::query("INSERT INTO poller_state (id, last_key) VALUES (1, x'ab')")
            .execute(store.pool())
            .await
            .unwrap();
        store.close().await;

        // Second init on the same file must find the schema and the row
        let storage = AppStorage::init_for_test(_tmp.path().to_path_buf());
        let reopened = SqliteService::init(&storage).await.unwrap();
        let key: Option<Vec<u8>> = sqlx::query_scalar("SELECT last_key FROM poller_state")
            .fetch_one(reopened.pool())
            .await
            .unwrap();
        assert_eq!(key.as_deref(), Some([0xab].as_slice()));
    }
}
