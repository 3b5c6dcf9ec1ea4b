//! Configuration parsing for Courier.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheKeys;
use crate::fanout::FanoutConfig;
use crate::service::ServiceSettings;

/// Name of the SQLite database file inside the data directory.
pub const DB_FILE_NAME: &str = "courier.db";

/// Cache backend selection.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// In-process cache, lost on exit
    Memory,
    /// Redis at `--redis-url` (requires the `redis-cache` feature)
    Redis,
}

/// Log output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Runtime configuration shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Data directory for SQLite database
    #[arg(short, long, env = "COURIER_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "COURIER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Size of the SQLite connection pool
    #[arg(long, env = "COURIER_POOL_SIZE", default_value_t = 10)]
    pub pool_size: u32,

    /// How long a writer waits for the database write lock (milliseconds)
    #[arg(long, env = "COURIER_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,

    /// Cache backend
    #[arg(long, env = "COURIER_CACHE_BACKEND", value_enum, default_value_t = CacheBackend::Memory)]
    pub cache_backend: CacheBackend,

    /// Redis connection URL (used with `--cache-backend redis`)
    #[arg(long, env = "COURIER_REDIS_URL", default_value = "redis://127.0.0.1:6379/0")]
    pub redis_url: String,

    /// Expiry of per-notification snapshots (seconds)
    #[arg(long, env = "COURIER_CACHE_TTL_SECS", default_value_t = 600)]
    pub cache_ttl_secs: u64,

    /// Key of the recent-list set
    #[arg(long, env = "COURIER_RECENT_LIST_KEY", default_value = "notifications:recent")]
    pub recent_list_key: String,

    /// Prefix of per-notification snapshot keys
    #[arg(long, env = "COURIER_NOTIFICATION_KEY_PREFIX", default_value = "notification:")]
    pub notification_key_prefix: String,

    /// Expiry of the recent-list rebuild lock (seconds)
    #[arg(long, env = "COURIER_REBUILD_LOCK_TTL_SECS", default_value_t = 30)]
    pub rebuild_lock_ttl_secs: u64,

    /// How long a reader waits for another rebuild before reading the store (milliseconds)
    #[arg(long, env = "COURIER_LOCK_WAIT_MS", default_value_t = 100)]
    pub lock_wait_ms: u64,

    /// Maximum concurrent background jobs
    #[arg(long, env = "COURIER_FANOUT_WORKERS", default_value_t = 4)]
    pub fanout_workers: usize,

    /// Maximum queued background jobs
    #[arg(long, env = "COURIER_FANOUT_CAPACITY", default_value_t = 1024)]
    pub fanout_capacity: usize,

    /// Per-job time limit for background jobs (milliseconds)
    #[arg(long, env = "COURIER_FANOUT_JOB_TIMEOUT_MS", default_value_t = 5000)]
    pub fanout_job_timeout_ms: u64,

    /// Size of the event bus buffer
    #[arg(long, env = "COURIER_EVENT_CHANNEL_SIZE", default_value_t = 1024)]
    pub event_channel_size: usize,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

impl Config {
    /// Path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn cache_keys(&self) -> CacheKeys {
        CacheKeys::new(&self.recent_list_key, &self.notification_key_prefix)
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            entity_ttl: Duration::from_secs(self.cache_ttl_secs),
            rebuild_lock_ttl: Duration::from_secs(self.rebuild_lock_ttl_secs),
            lock_wait: Duration::from_millis(self.lock_wait_ms),
            ..ServiceSettings::default()
        }
    }

    pub fn fanout_config(&self) -> FanoutConfig {
        FanoutConfig {
            workers: self.fanout_workers.max(1),
            capacity: self.fanout_capacity.max(1),
            job_timeout: Duration::from_millis(self.fanout_job_timeout_ms),
            ..FanoutConfig::default()
        }
    }

    /// Create a configuration for tests rooted at `data_dir`.
    pub fn test_config(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            log_level: "debug".into(),
            pool_size: 4,
            fanout_capacity: 64,
            event_channel_size: 64,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".into(),
            log_format: LogFormat::Text,
            pool_size: 10,
            busy_timeout_ms: 5000,
            cache_backend: CacheBackend::Memory,
            redis_url: "redis://127.0.0.1:6379/0".into(),
            cache_ttl_secs: 600,
            recent_list_key: "notifications:recent".into(),
            notification_key_prefix: "notification:".into(),
            rebuild_lock_ttl_secs: 30,
            lock_wait_ms: 100,
            fanout_workers: 4,
            fanout_capacity: 1024,
            fanout_job_timeout_ms: 5000,
            event_channel_size: 1024,
            otel_endpoint: None,
        }
    }
}
