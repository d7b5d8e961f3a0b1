//! Ingestion service client
//!
//! Reads spans out of the upstream ingestion WAL over server-streaming gRPC.
//! The channel is plaintext (internal network), lazily connected, and kept
//! alive with HTTP/2 pings so it survives idle poll intervals; transient
//! failures are retried by the next poll cycle over the same channel.

use std::time::Duration;

use thiserror::Error;
use tonic::transport::{Channel, Endpoint};

use crate::core::config::IngestionConfig;
use crate::core::constants::{INGESTION_KEEPALIVE_INTERVAL_SECS, INGESTION_KEEPALIVE_TIMEOUT_SECS};
use crate::proto::ingestion::v1::ReadSpansRequest;
use crate::proto::ingestion::v1::internal_ingestion_service_client::InternalIngestionServiceClient;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("RPC error: {0}")]
    Rpc(#[from] tonic::Status),
}

/// One record from the ingestion WAL
#[derive(Debug, Clone)]
pub struct SpanFrame {
    /// Time-ordered WAL key; the last frame's key is the new high-water mark
    pub key: Vec<u8>,
    /// Serialized OTLP Span
    pub span_bytes: Vec<u8>,
    /// Serialized OTLP Resource
    pub resource_bytes: Vec<u8>,
}

/// gRPC client for the ingestion service's internal span-read surface
pub struct IngestionClient {
    client: InternalIngestionServiceClient<Channel>,
}

impl IngestionClient {
    /// Create a client for the configured endpoint.
    ///
    /// The channel connects lazily so startup does not depend on the
    /// ingestion service being up; each poll re-attempts transparently.
    pub fn connect(config: &IngestionConfig) -> Result<Self, ReaderError> {
        let endpoint = Endpoint::from_shared(format!("http://{}:{}", config.host, config.port))?
            .http2_keep_alive_interval(Duration::from_secs(INGESTION_KEEPALIVE_INTERVAL_SECS))
            .keep_alive_timeout(Duration::from_secs(INGESTION_KEEPALIVE_TIMEOUT_SECS))
            .keep_alive_while_idle(true);

        let channel = endpoint.connect_lazy();
        tracing::debug!(host = %config.host, port = config.port, "Ingestion client created");

        Ok(Self {
            client: InternalIngestionServiceClient::new(channel),
        })
    }

    /// Read up to `batch_size` frames strictly after `start_key`.
    ///
    /// Collects the whole stream before returning, bounding memory to
    /// batch_size x frame size. An empty vec means no new data.
    pub async fn read_spans(
        &mut self,
        start_key: &[u8],
        batch_size: u32,
    ) -> Result<Vec<SpanFrame>, ReaderError> {
        let request = ReadSpansRequest {
            start_key_ulid: start_key.to_vec(),
            batch_size: batch_size as i32,
        };

        let mut stream = self.client.read_spans(request).await?.into_inner();

        let mut frames = Vec::new();
        while let Some(response) = stream.message().await? {
            frames.push(SpanFrame {
                key: response.key_ulid,
                span_bytes: response.span_bytes,
                resource_bytes: response.resource_bytes,
            });
        }

        if frames.is_empty() {
            tracing::debug!("No new spans available from ingestion service");
        } else {
            tracing::debug!(received = frames.len(), batch_size, "Read spans from ingestion service");
        }

        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_is_lazy() {
        // No listener on this port; lazy connection must still succeed
        let config = IngestionConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
        };
        assert!(IngestionClient::connect(&config).is_ok());
    }

    #[tokio::test]
    async fn test_read_spans_surfaces_rpc_error() {
        let config = IngestionConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
        };
        let mut client = IngestionClient::connect(&config).unwrap();
        let result = client.read_spans(b"", 10).await;
        assert!(result.is_err());
    }
}
