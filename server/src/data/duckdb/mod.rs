//! DuckDB columnar store
//!
//! Holds the span index (`spans`, `state_patches`). DuckDB permits a single
//! writer per database, so the whole store lives behind one mutex-guarded
//! connection: the poller's batch transactions and the read helpers take
//! turns on it, and async callers hop onto the blocking pool via
//! [`DuckdbService::with_conn`]. A background task checkpoints the WAL
//! between batches.

pub mod error;
mod migrations;
pub mod models;
pub mod repositories;
pub mod schema;
pub mod sql_types;

// Re-export repositories for convenient access
pub use repositories::patch as patch_repository;
pub use repositories::span as span_repository;

pub use models::{SpanRecord, SpanRow, StatePatchRow};

pub use error::DuckdbError;

use std::sync::Arc;
use std::time::Duration;

use duckdb::Connection;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::constants::{
    DUCKDB_CHECKPOINT_INTERVAL_SECS, DUCKDB_DB_FILENAME, DUCKDB_QUERY_TIMEOUT_SECS,
};
use crate::core::storage::{AppStorage, DataSubdir};

/// The span index service.
///
/// `None` in the slot means `close()` already ran; only shutdown gets the
/// store into that state.
pub struct DuckdbService {
    conn: Mutex<Option<Connection>>,
}

impl DuckdbService {
    /// Open the database file, apply session settings, and bring the schema
    /// current. Everything runs on the blocking pool; a failure here is
    /// fatal to startup.
    pub async fn init(storage: &AppStorage) -> Result<Self, DuckdbError> {
        let db_path = storage.subdir(DataSubdir::Duckdb).join(DUCKDB_DB_FILENAME);

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, DuckdbError> {
            let conn = Connection::open(&db_path)?;
            // Headless store: no extension autoloading. TimeZone is pinned
            // so TIMESTAMPTZ literals written with +00 offsets read back as
            // the same instant. json powers the read-side attribute filter.
            conn.execute_batch(
                "SET autoinstall_known_extensions = false;
                 SET autoload_known_extensions = false;
                 SET TimeZone = 'UTC';
                 PRAGMA enable_checkpoint_on_shutdown;
                 LOAD json;",
            )?;
            migrations::run_migrations(&conn)?;
            tracing::debug!(path = %db_path.display(), "DuckDB span index opened");
            Ok(conn)
        })
        .await
        .map_err(|e| DuckdbError::Io(std::io::Error::other(e)))??;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Exclusive access to the underlying connection.
    ///
    /// # Panics
    /// Panics once `close()` has taken the connection; nothing may touch
    /// the store after shutdown begins closing it.
    pub fn conn(&self) -> parking_lot::MappedMutexGuard<'_, Connection> {
        MutexGuard::map(self.conn.lock(), |slot| {
            slot.as_mut().expect("DuckDB store is closed")
        })
    }

    /// Whether the connection is still live (test utility only)
    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Run `f` against the connection on the blocking pool, bounded by the
    /// query timeout. This is the async entry point for batch writes and
    /// read helpers alike.
    pub async fn with_conn<T, F>(self: &Arc<Self>, f: F) -> Result<T, DuckdbError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, DuckdbError> + Send + 'static,
    {
        let db = Arc::clone(self);
        let work = tokio::task::spawn_blocking(move || {
            let conn = db.conn();
            f(&conn)
        });

        match tokio::time::timeout(Duration::from_secs(DUCKDB_QUERY_TIMEOUT_SECS), work).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                tracing::error!(error = %join_error, "DuckDB blocking task failed");
                Err(DuckdbError::Io(std::io::Error::other(join_error)))
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = DUCKDB_QUERY_TIMEOUT_SECS,
                    "DuckDB operation timed out"
                );
                Err(DuckdbError::Timeout {
                    timeout_secs: DUCKDB_QUERY_TIMEOUT_SECS,
                })
            }
        }
    }

    /// Flush the WAL into the main database file. A no-op once closed.
    pub async fn checkpoint(self: &Arc<Self>) -> Result<(), DuckdbError> {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let guard = db.conn.lock();
            match guard.as_ref() {
                Some(conn) => {
                    conn.execute("CHECKPOINT", [])?;
                    Ok(())
                }
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| DuckdbError::Io(std::io::Error::other(e)))?
    }

    /// Take the connection out of service: final checkpoint, then close.
    /// After this every `conn()` caller panics, so shutdown sequencing must
    /// have stopped the poller first.
    pub async fn close(self: Arc<Self>) -> Result<(), DuckdbError> {
        tokio::task::spawn_blocking(move || {
            let Some(conn) = self.conn.lock().take() else {
                return Ok(());
            };
            if let Err(e) = conn.execute("CHECKPOINT", []) {
                tracing::warn!(error = %e, "Final checkpoint failed, closing anyway");
            }
            conn.close().map_err(|(_, e)| DuckdbError::Database(e))?;
            tracing::debug!("DuckDB span index closed");
            Ok(())
        })
        .await
        .map_err(|e| DuckdbError::Io(std::io::Error::other(e)))?
    }

    /// Checkpoint on a fixed period until the shutdown signal fires.
    pub fn start_checkpoint_task(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let db = Arc::clone(self);
        tokio::spawn(async move {
            let period = Duration::from_secs(DUCKDB_CHECKPOINT_INTERVAL_SECS);
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
                    tracing::warn!(error = %e, "Periodic DuckDB checkpoint failed");
                }
            }
            tracing::debug!("DuckDB checkpoint task stopped");
        })
    }
}

/// Run `f` inside a transaction: commit on Ok, roll back on Err.
pub(crate) fn in_transaction<F, T>(conn: &Connection, f: F) -> Result<T, DuckdbError>
where
    F: FnOnce(&Connection) -> Result<T, DuckdbError>,
{
    conn.execute_batch("BEGIN TRANSACTION")?;
    let result = f(conn);
    match &result {
        Ok(_) => conn.execute_batch("COMMIT")?,
        Err(_) => {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "Rollback failed, connection may still be in a transaction");
            }
        }
    }
    result
}
