// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display and platform directories)
pub const APP_NAME: &str = "Junjo";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "junjo";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".junjo";

// =============================================================================
// Environment Variables
// =============================================================================

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "JUNJO_LOG";

/// Environment variable to override data directory
pub const ENV_DATA_DIR: &str = "JUNJO_DATA_DIR";

/// Environment variable for the bind host of the internal auth gRPC server
pub const ENV_HOST: &str = "JUNJO_HOST";

/// Environment variable for the internal auth gRPC port
pub const ENV_GRPC_PORT: &str = "GRPC_PORT";

/// Environment variable for the ingestion service hostname
pub const ENV_INGESTION_HOST: &str = "INGESTION_HOST";

/// Environment variable for the ingestion service port
pub const ENV_INGESTION_PORT: &str = "INGESTION_PORT";

/// Environment variable for the poll interval in seconds
pub const ENV_SPAN_POLL_INTERVAL: &str = "SPAN_POLL_INTERVAL";

/// Environment variable for the max frames per poll
pub const ENV_SPAN_BATCH_SIZE: &str = "SPAN_BATCH_SIZE";

/// Environment variable for strict batch decoding
pub const ENV_SPAN_STRICT_MODE: &str = "SPAN_STRICT_MODE";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default bind host for the internal auth gRPC server
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default port for the internal auth gRPC server
pub const DEFAULT_GRPC_PORT: u16 = 50053;

/// Default ingestion service hostname
pub const DEFAULT_INGESTION_HOST: &str = "junjo-server-ingestion";

/// Default ingestion service port
pub const DEFAULT_INGESTION_PORT: u16 = 50052;

// =============================================================================
// Span Poller
// =============================================================================

/// Default seconds between poll cycles
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Minimum allowed poll interval
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Maximum allowed poll interval
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;

/// Default max frames requested per poll cycle
pub const DEFAULT_SPAN_BATCH_SIZE: u32 = 100;

/// Maximum allowed frames per poll cycle
pub const MAX_SPAN_BATCH_SIZE: u32 = 10_000;

/// Service name used when the resource omits `service.name`
pub const SERVICE_NAME_FALLBACK: &str = "NO_SERVICE_NAME";

// =============================================================================
// Ingestion gRPC Channel
// =============================================================================

/// HTTP/2 keepalive ping interval for the ingestion channel
pub const INGESTION_KEEPALIVE_INTERVAL_SECS: u64 = 10;

/// HTTP/2 keepalive ping timeout for the ingestion channel
pub const INGESTION_KEEPALIVE_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// SQLite Database
// =============================================================================

/// SQLite database filename
pub const SQLITE_DB_FILENAME: &str = "junjo.db";

/// SQLite connection pool max connections
pub const SQLITE_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in seconds
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;

/// Interval between periodic WAL checkpoints (seconds)
pub const SQLITE_CHECKPOINT_INTERVAL_SECS: u64 = 300;

// =============================================================================
// DuckDB Database
// =============================================================================

/// DuckDB database filename
pub const DUCKDB_DB_FILENAME: &str = "junjo.duckdb";

/// Interval between periodic DuckDB checkpoints (seconds)
pub const DUCKDB_CHECKPOINT_INTERVAL_SECS: u64 = 300;

/// Timeout for blocking DuckDB queries (seconds)
pub const DUCKDB_QUERY_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Query Limits
// =============================================================================

/// Default result limit for span read helpers
pub const QUERY_LIMIT_DEFAULT: usize = 500;

/// Maximum result limit for span read helpers
pub const QUERY_LIMIT_MAX: usize = 10_000;

// =============================================================================
// API Keys
// =============================================================================

/// Length of generated API keys
pub const API_KEY_LENGTH: usize = 64;

/// How many characters of a key are safe to log
pub const API_KEY_LOG_PREFIX_LEN: usize = 12;

// =============================================================================
// Shutdown
// =============================================================================

/// Grace period for background tasks during shutdown (seconds)
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 5;
