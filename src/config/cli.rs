use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the sharelist binary.
#[derive(Debug, Parser)]
#[command(name = "sharelist", version, about = "Shared list server with live updates")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SHARELIST_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP and WebSocket server.
    Serve(Box<ServeArgs>),
    /// Mint a bearer token for a user id using the configured secret.
    #[command(name = "issue-token")]
    IssueToken(IssueTokenArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct AuthOverrides {
    /// Override the HS256 token secret.
    #[arg(long = "auth-token-secret", value_name = "SECRET")]
    pub token_secret: Option<String>,

    /// Override the expected token issuer.
    #[arg(long = "auth-token-issuer", value_name = "ISSUER")]
    pub token_issuer: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub auth: AuthOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the storage backend (postgres|memory).
    #[arg(long = "storage-backend", value_name = "BACKEND")]
    pub storage_backend: Option<String>,

    /// Toggle the list cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the cache backend (memory|redis).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the Redis URL used by the redis cache backend.
    #[arg(long = "cache-redis-url", value_name = "URL")]
    pub cache_redis_url: Option<String>,

    /// Override the cached list lifetime.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the per-observer outbound queue size.
    #[arg(long = "hub-observer-queue-capacity", value_name = "COUNT")]
    pub hub_observer_queue_capacity: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct IssueTokenArgs {
    #[command(flatten)]
    pub auth: AuthOverrides,

    /// Numeric user id placed in the `sub` claim.
    #[arg(long = "user-id", value_name = "ID")]
    pub user_id: i64,

    /// Token lifetime; defaults to `auth.token_ttl_hours`.
    #[arg(long = "ttl-hours", value_name = "HOURS")]
    pub ttl_hours: Option<u64>,
}
