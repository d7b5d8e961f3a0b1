use anyhow::{Result, bail};

use super::cli::CliConfig;
use super::constants::{
    DEFAULT_GRPC_PORT, DEFAULT_HOST, DEFAULT_INGESTION_HOST, DEFAULT_INGESTION_PORT,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SPAN_BATCH_SIZE, MAX_POLL_INTERVAL_SECS,
    MAX_SPAN_BATCH_SIZE, MIN_POLL_INTERVAL_SECS,
};

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ingestion: IngestionConfig,
    pub poller: PollerConfig,
}

/// Internal auth gRPC server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub grpc_port: u16,
}

/// Upstream ingestion service endpoint
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub host: String,
    pub port: u16,
}

/// Span poller tuning
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Seconds between poll cycles
    pub poll_interval_secs: u64,
    /// Max frames requested per poll cycle
    pub batch_size: u32,
    /// When true, any frame decode failure abandons the batch
    pub strict_mode: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            batch_size: DEFAULT_SPAN_BATCH_SIZE,
            strict_mode: false,
        }
    }
}

impl AppConfig {
    /// Build and validate configuration from CLI/env values.
    ///
    /// Out-of-range poller settings are a startup error rather than being
    /// silently clamped.
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let poll_interval_secs = cli.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&poll_interval_secs) {
            bail!(
                "poll interval {}s out of range {}-{}s",
                poll_interval_secs,
                MIN_POLL_INTERVAL_SECS,
                MAX_POLL_INTERVAL_SECS
            );
        }

        let batch_size = cli.batch_size.unwrap_or(DEFAULT_SPAN_BATCH_SIZE);
        if !(1..=MAX_SPAN_BATCH_SIZE).contains(&batch_size) {
            bail!(
                "span batch size {} out of range 1-{}",
                batch_size,
                MAX_SPAN_BATCH_SIZE
            );
        }

        Ok(Self {
            server: ServerConfig {
                host: cli.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
                grpc_port: cli.grpc_port.unwrap_or(DEFAULT_GRPC_PORT),
            },
            ingestion: IngestionConfig {
                host: cli
                    .ingestion_host
                    .clone()
                    .unwrap_or_else(|| DEFAULT_INGESTION_HOST.to_string()),
                port: cli.ingestion_port.unwrap_or(DEFAULT_INGESTION_PORT),
            },
            poller: PollerConfig {
                poll_interval_secs,
                batch_size,
                strict_mode: cli.strict_mode.unwrap_or(false),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults() {
        let config = AppConfig::load(&CliConfig::default()).unwrap();
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.grpc_port, DEFAULT_GRPC_PORT);
        assert_eq!(config.ingestion.host, DEFAULT_INGESTION_HOST);
        assert_eq!(config.ingestion.port, DEFAULT_INGESTION_PORT);
        assert_eq!(config.poller.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(config.poller.batch_size, DEFAULT_SPAN_BATCH_SIZE);
        assert!(!config.poller.strict_mode);
    }

    #[test]
    fn test_load_overrides() {
        let cli = CliConfig {
            host: Some("127.0.0.1".to_string()),
            grpc_port: Some(50153),
            ingestion_host: Some("localhost".to_string()),
            ingestion_port: Some(50152),
            poll_interval: Some(30),
            batch_size: Some(500),
            strict_mode: Some(true),
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.server.grpc_port, 50153);
        assert_eq!(config.ingestion.host, "localhost");
        assert_eq!(config.poller.poll_interval_secs, 30);
        assert_eq!(config.poller.batch_size, 500);
        assert!(config.poller.strict_mode);
    }

    #[test]
    fn test_poll_interval_zero_rejected() {
        let cli = CliConfig {
            poll_interval: Some(0),
            ..Default::default()
        };
        assert!(AppConfig::load(&cli).is_err());
    }

    #[test]
    fn test_poll_interval_too_large_rejected() {
        let cli = CliConfig {
            poll_interval: Some(3601),
            ..Default::default()
        };
        assert!(AppConfig::load(&cli).is_err());
    }

    #[test]
    fn test_batch_size_bounds() {
        let zero = CliConfig {
            batch_size: Some(0),
            ..Default::default()
        };
        assert!(AppConfig::load(&zero).is_err());

        let max = CliConfig {
            batch_size: Some(10_000),
            ..Default::default()
        };
        assert!(AppConfig::load(&max).is_ok());

        let over = CliConfig {
            batch_size: Some(10_001),
            ..Default::default()
        };
        assert!(AppConfig::load(&over).is_err());
    }
}
