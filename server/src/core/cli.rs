use clap::Parser;

use super::constants::{
    ENV_GRPC_PORT, ENV_HOST, ENV_INGESTION_HOST, ENV_INGESTION_PORT, ENV_SPAN_BATCH_SIZE,
    ENV_SPAN_POLL_INTERVAL, ENV_SPAN_STRICT_MODE,
};

#[derive(Parser)]
#[command(name = "junjo-server")]
#[command(version, about = "Workflow observability control plane", long_about = None)]
pub struct Cli {
    /// Bind host for the internal auth gRPC server
    #[arg(long, short = 'H', env = ENV_HOST)]
    pub host: Option<String>,

    /// Port for the internal auth gRPC server
    #[arg(long, env = ENV_GRPC_PORT)]
    pub grpc_port: Option<u16>,

    /// Ingestion service hostname
    #[arg(long, env = ENV_INGESTION_HOST)]
    pub ingestion_host: Option<String>,

    /// Ingestion service port
    #[arg(long, env = ENV_INGESTION_PORT)]
    pub ingestion_port: Option<u16>,

    /// Seconds between span poll cycles (1-3600)
    #[arg(long, env = ENV_SPAN_POLL_INTERVAL)]
    pub poll_interval: Option<u64>,

    /// Max frames requested per poll cycle (1-10000)
    #[arg(long, env = ENV_SPAN_BATCH_SIZE)]
    pub batch_size: Option<u32>,

    /// Abandon the whole batch when any frame fails to decode
    #[arg(long, env = ENV_SPAN_STRICT_MODE)]
    pub strict_mode: Option<bool>,
}

/// Configuration derived from CLI arguments and environment
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub grpc_port: Option<u16>,
    pub ingestion_host: Option<String>,
    pub ingestion_port: Option<u16>,
    pub poll_interval: Option<u64>,
    pub batch_size: Option<u32>,
    pub strict_mode: Option<bool>,
}

/// Parse CLI arguments into a config
pub fn parse() -> CliConfig {
    let cli = Cli::parse();
    CliConfig {
        host: cli.host,
        grpc_port: cli.grpc_port,
        ingestion_host: cli.ingestion_host,
        ingestion_port: cli.ingestion_port,
        poll_interval: cli.poll_interval,
        batch_size: cli.batch_size,
        strict_mode: cli.strict_mode,
    }
}
