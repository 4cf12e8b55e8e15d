//! Typed configuration for both binaries, populated once at boot: env
//! vars with documented defaults, overridable by CLI flags.

use crate::error::ConfigError;
use clap::Parser;
use std::env;

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        }),
    }
}

/// CLI overrides for the ingest process. Unset flags fall back to the
/// environment, then to the documented default.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "FlowTrace trade ingest + routing process")]
pub struct IngestArgs {
    #[arg(long)]
    pub workers: Option<u32>,
    #[arg(long)]
    pub fast_socket: Option<String>,
    #[arg(long)]
    pub queue_db: Option<String>,
    #[arg(long)]
    pub snapshot_interval_secs: Option<u64>,
    #[arg(long)]
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub worker_count: u32,
    pub fast_channel_path: String,
    pub durable_queue_path: String,
    pub snapshot_interval_secs: u64,
    pub exchange: String,
}

impl IngestConfig {
    /// Reads environment defaults, then applies `args` on top.
    pub fn from_env(args: &IngestArgs) -> Result<Self, ConfigError> {
        let worker_count = args
            .workers
            .map(Ok)
            .unwrap_or_else(|| parse_env("FLOWTRACE_WORKERS", 4))?;
        let snapshot_interval_secs = args
            .snapshot_interval_secs
            .map(Ok)
            .unwrap_or_else(|| parse_env("FLOWTRACE_SNAPSHOT_INTERVAL_SECS", 30))?;

        Ok(IngestConfig {
            worker_count,
            fast_channel_path: args
                .fast_socket
                .clone()
                .unwrap_or_else(|| env_or_default("FLOWTRACE_FAST_SOCKET", "/tmp/flowtrace/fast.sock")),
            durable_queue_path: args
                .queue_db
                .clone()
                .unwrap_or_else(|| env_or_default("FLOWTRACE_QUEUE_DB", "/tmp/flowtrace/queue.db")),
            snapshot_interval_secs,
            exchange: args
                .exchange
                .clone()
                .unwrap_or_else(|| env_or_default("FLOWTRACE_EXCHANGE", "binance")),
        })
    }
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about = "FlowTrace candle persistence process")]
pub struct PersistenceArgs {
    #[arg(long)]
    pub fast_socket: Option<String>,
    #[arg(long)]
    pub queue_db: Option<String>,
    #[arg(long)]
    pub storage_dir: Option<String>,
    #[arg(long)]
    pub health_port: Option<u16>,
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
    #[arg(long)]
    pub queue_retention_hours: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceConfig {
    pub socket_path: String,
    pub durable_queue_path: String,
    pub storage_dir: String,
    pub health_port: u16,
    pub poll_interval_ms: u64,
    pub queue_retention_hours: u64,
}

impl PersistenceConfig {
    pub fn from_env(args: &PersistenceArgs) -> Result<Self, ConfigError> {
        let health_port = args
            .health_port
            .map(Ok)
            .unwrap_or_else(|| parse_env("FLOWTRACE_HEALTH_PORT", 8090))?;
        let poll_interval_ms = args
            .poll_interval_ms
            .map(Ok)
            .unwrap_or_else(|| parse_env("FLOWTRACE_POLL_INTERVAL_MS", 1000))?;
        let queue_retention_hours = args
            .queue_retention_hours
            .map(Ok)
            .unwrap_or_else(|| parse_env("FLOWTRACE_QUEUE_RETENTION_HOURS", 24))?;

        Ok(PersistenceConfig {
            socket_path: args
                .fast_socket
                .clone()
                .unwrap_or_else(|| env_or_default("FLOWTRACE_FAST_SOCKET", "/tmp/flowtrace/fast.sock")),
            durable_queue_path: args
                .queue_db
                .clone()
                .unwrap_or_else(|| env_or_default("FLOWTRACE_QUEUE_DB", "/tmp/flowtrace/queue.db")),
            storage_dir: args
                .storage_dir
                .clone()
                .unwrap_or_else(|| env_or_default("FLOWTRACE_STORAGE_DIR", "/tmp/flowtrace/storage")),
            health_port,
            poll_interval_ms,
            queue_retention_hours,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_config_defaults_when_nothing_set() {
        let args = IngestArgs::default();
        // Safe to call in isolation: no FLOWTRACE_* vars are set by the
        // test harness. If they ever are, parse_env still succeeds.
        let cfg = IngestConfig::from_env(&args).unwrap();
        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.exchange, "binance");
        assert_eq!(cfg.snapshot_interval_secs, 30);
    }

    #[test]
    fn cli_flag_overrides_default() {
        let mut args = IngestArgs::default();
        args.workers = Some(16);
        let cfg = IngestConfig::from_env(&args).unwrap();
        assert_eq!(cfg.worker_count, 16);
    }

    #[test]
    fn persistence_config_defaults() {
        let args = PersistenceArgs::default();
        let cfg = PersistenceConfig::from_env(&args).unwrap();
        assert_eq!(cfg.health_port, 8090);
        assert_eq!(cfg.queue_retention_hours, 24);
    }
}
