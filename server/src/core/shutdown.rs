//! Graceful shutdown coordination
//!
//! One watch channel fans the stop signal out to every long-lived task (the
//! span poller, the auth gRPC server, the checkpoint loops). Shutdown then
//! runs in startup-reverse order: tasks drain first under a bounded grace
//! period, and only once the poller can no longer write do the two stores
//! get flushed and closed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::constants::SHUTDOWN_TIMEOUT_SECS;
use crate::data::{DuckdbService, SqliteService};

#[derive(Clone)]
pub struct ShutdownService {
    signal: Arc<watch::Sender<bool>>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    database: Arc<SqliteService>,
    analytics: Arc<DuckdbService>,
}

impl ShutdownService {
    pub fn new(database: Arc<SqliteService>, analytics: Arc<DuckdbService>) -> Self {
        // The initial receiver is dropped; tasks get theirs via subscribe().
        // trigger() uses send_replace, which works with zero receivers.
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
            handles: Arc::new(Mutex::new(Vec::new())),
            database,
            analytics,
        }
    }

    /// Track a task handle so `shutdown()` can wait for it to drain
    pub async fn register(&self, handle: JoinHandle<()>) {
        self.handles.lock().await.push(handle);
    }

    /// A receiver that flips to true when shutdown begins
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }

    /// Begin shutdown without waiting for anything
    pub fn trigger(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.signal.borrow()
    }

    /// Resolves once shutdown has been triggered
    pub fn wait(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.signal.subscribe();
        async move {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    /// Trigger shutdown, drain tasks, then flush and close the stores.
    ///
    /// Task drain is bounded: a wedged task forfeits its chance to finish,
    /// since holding the stores open indefinitely is worse than losing its
    /// in-flight cycle (the resume cursor makes that cycle re-runnable).
    pub async fn shutdown(&self) {
        self.trigger();

        let handles = std::mem::take(&mut *self.handles.lock().await);
        tracing::debug!(tasks = handles.len(), "Draining background tasks");

        let grace = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!(
                grace_secs = SHUTDOWN_TIMEOUT_SECS,
                "Background tasks still running after grace period, closing stores anyway"
            );
        }

        // Row store first (the cursor write is the last thing the poller
        // did), then the span index.
        if let Err(e) = self.database.checkpoint().await {
            tracing::warn!(error = %e, "Row store WAL flush failed");
        }
        self.database.close().await;

        if let Err(e) = self.analytics.checkpoint().await {
            tracing::warn!(error = %e, "Span index checkpoint failed");
        }
        if let Err(e) = Arc::clone(&self.analytics).close().await {
            tracing::warn!(error = %e, "Span index close failed");
        }

        tracing::debug!("Shutdown complete");
    }

    /// Arrange for Ctrl+C or SIGTERM to trigger shutdown
    pub fn install_signal_handlers(&self) {
        let service = self.clone();
        tokio::spawn(async move {
            wait_for_termination_signal().await;
            tracing::info!("Termination signal received, shutting down");
            service.trigger();
        });
    }
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::AppStorage;

    async fn make_shutdown() -> ShutdownService {
        let temp_dir = tempfile::tempdir().unwrap();
        let data_dir = temp_dir.keep();
        std::fs::create_dir_all(data_dir.join("sqlite")).unwrap();
        std::fs::create_dir_all(data_dir.join("duckdb")).unwrap();
        let storage = AppStorage::init_for_test(data_dir);
        let database = Arc::new(SqliteService::init(&storage).await.unwrap());
        let analytics = Arc::new(DuckdbService::init(&storage).await.unwrap());
        ShutdownService::new(database, analytics)
    }

    #[tokio::test]
    async fn test_starts_untriggered() {
        let shutdown = make_shutdown().await;
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_trigger_with_no_subscribers() {
        // No receiver exists yet; the signal must still stick
        let shutdown = make_shutdown().await;
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        assert!(*shutdown.subscribe().borrow());
    }

    #[tokio::test]
    async fn test_subscriber_sees_trigger() {
        let shutdown = make_shutdown().await;
        let rx = shutdown.subscribe();

        assert!(!*rx.borrow());
        shutdown.trigger();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_wait_resolves_after_trigger() {
        let shutdown = make_shutdown().await;
        let waiting = tokio::spawn(shutdown.wait());

        tokio::task::yield_now().await;
        shutdown.trigger();

        tokio::time::timeout(Duration::from_millis(100), waiting)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_resolves_when_already_triggered() {
        let shutdown = make_shutdown().await;
        shutdown.trigger();

        // A wait started after the fact must not hang
        tokio::time::timeout(Duration::from_millis(100), shutdown.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_registered_tasks() {
        let shutdown = make_shutdown().await;

        let mut rx = shutdown.subscribe();
        shutdown
            .register(tokio::spawn(async move {
                let _ = rx.wait_for(|&stop| stop).await;
            }))
            .await;

        shutdown.shutdown().await;
        assert!(shutdown.is_triggered());
    }
}
