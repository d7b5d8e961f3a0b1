//! Core application

use std::sync::Arc;

use anyhow::Result;

use crate::api::AuthGrpcServer;
use crate::core::cli;
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::core::storage::AppStorage;
use crate::data::{DuckdbService, SqliteService};
use crate::domain::SpanPoller;
use crate::domain::spans::IngestionClient;

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub storage: AppStorage,
    pub database: Arc<SqliteService>,
    pub analytics: Arc<DuckdbService>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let cli_config = cli::parse();
        let app = Self::init(&cli_config).await?;
        Self::start_server(app).await
    }

    async fn init(cli: &cli::CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let storage = AppStorage::init().await?;

        let (database, analytics) = tokio::try_join!(
            async {
                SqliteService::init(&storage)
                    .await
                    .map_err(anyhow::Error::from)
            },
            async {
                DuckdbService::init(&storage)
                    .await
                    .map_err(anyhow::Error::from)
            },
        )?;

        let database = Arc::new(database);
        let analytics = Arc::new(analytics);
        let shutdown = ShutdownService::new(database.clone(), analytics.clone());

        Ok(Self {
            shutdown,
            config,
            storage,
            database,
            analytics,
        })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        app.start_background_tasks().await?;

        tracing::info!(
            data_dir = %app.storage.data_dir().display(),
            grpc_port = app.config.server.grpc_port,
            ingestion = %format!("{}:{}", app.config.ingestion.host, app.config.ingestion.port),
            poll_interval_s = app.config.poller.poll_interval_secs,
            "Junjo server running"
        );

        // The two long-lived tasks run until the shutdown signal fires
        app.shutdown.wait().await;
        app.shutdown.shutdown().await;

        Ok(())
    }

    pub async fn start_background_tasks(&self) -> Result<()> {
        self.shutdown
            .register(
                self.database
                    .start_checkpoint_task(self.shutdown.subscribe()),
            )
            .await;

        self.shutdown
            .register(
                self.analytics
                    .start_checkpoint_task(self.shutdown.subscribe()),
            )
            .await;

        // Span ingestion poller
        let client = IngestionClient::connect(&self.config.ingestion)?;
        let poller = SpanPoller::new(
            self.analytics.clone(),
            self.database.clone(),
            client,
            self.config.poller.clone(),
        );
        self.shutdown
            .register(poller.start(self.shutdown.subscribe()))
            .await;

        // Internal auth gRPC server
        let grpc_server = AuthGrpcServer::new(&self.config.server, self.database.clone())?;
        let shutdown_rx = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            if let Err(e) = grpc_server.start(shutdown_rx).await {
                tracing::error!(error = %e, "Internal auth gRPC server error");
            }
        });
        self.shutdown.register(handle).await;

        tracing::debug!("Background tasks started");
        Ok(())
    }
}
