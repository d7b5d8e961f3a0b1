//! Internal auth gRPC server
//!
//! Serves ValidateApiKey for the ingestion service, which calls it to admit
//! external span producers. Fail-closed: a database error is reported to the
//! caller as an invalid key, never as an RPC error. Plaintext, intended for
//! internal networks only.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tonic::transport::Server as TonicServer;
use tonic::{Request, Response, Status};

use crate::core::config::ServerConfig;
use crate::core::constants::API_KEY_LOG_PREFIX_LEN;
use crate::data::SqliteService;
use crate::data::sqlite::repositories::api_key;
use crate::proto::auth::v1::internal_auth_service_server::{
    InternalAuthService, InternalAuthServiceServer,
};
use crate::proto::auth::v1::{ValidateApiKeyRequest, ValidateApiKeyResponse};

pub struct AuthGrpcServer {
    addr: SocketAddr,
    database: Arc<SqliteService>,
}

impl AuthGrpcServer {
    pub fn new(config: &ServerConfig, database: Arc<SqliteService>) -> Result<Self> {
        let addr = SocketAddr::new(config.host.parse()?, config.grpc_port);
        Ok(Self { addr, database })
    }

    pub async fn start(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let addr = self.addr;
        tracing::debug!(%addr, "Starting internal auth gRPC server");

        TonicServer::builder()
            .add_service(InternalAuthServiceServer::new(AuthService::new(
                self.database,
            )))
            .serve_with_shutdown(addr, async move {
                let _ = shutdown_rx.wait_for(|&v| v).await;
                tracing::debug!("Internal auth gRPC server shutting down");
            })
            .await?;

        Ok(())
    }
}

/// Log-safe prefix of an API key; the full value never reaches the logs
fn key_log_prefix(api_key: &str) -> &str {
    api_key.get(..API_KEY_LOG_PREFIX_LEN).unwrap_or("***")
}

/// gRPC handler for API key validation
struct AuthService {
    database: Arc<SqliteService>,
}

impl AuthService {
    fn new(database: Arc<SqliteService>) -> Self {
        Self { database }
    }
}

#[tonic::async_trait]
impl InternalAuthService for AuthService {
    async fn validate_api_key(
        &self,
        request: Request<ValidateApiKeyRequest>,
    ) -> Result<Response<ValidateApiKeyResponse>, Status> {
        let api_key = request.into_inner().api_key;
        let prefix = key_log_prefix(&api_key);

        let is_valid = match api_key::get_by_key(self.database.pool(), &api_key).await {
            Ok(Some(_)) => {
                tracing::debug!(key_prefix = prefix, "API key validated");
                true
            }
            Ok(None) => {
                tracing::info!(key_prefix = prefix, "API key not found");
                false
            }
            Err(e) => {
                // Fail closed: a lookup error denies access
                tracing::error!(key_prefix = prefix, error = %e, "API key lookup failed");
                false
            }
        };

        Ok(Response::new(ValidateApiKeyResponse { is_valid }))
    }
}
