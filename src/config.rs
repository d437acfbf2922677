use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;

use crate::limits::*;

/// Tuning for the booking engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How far past a rejected start the alternative search looks.
    pub search_horizon: TimeDelta,
    /// Alternatives attached to a scheduling conflict.
    pub max_alternatives: usize,
    /// Bound on every store call and participant lock wait.
    pub store_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_horizon: TimeDelta::days(7),
            max_alternatives: 3,
            store_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let horizon_hours: i64 = env_or("HUDDLE_SEARCH_HORIZON_HOURS", defaults.search_horizon.num_hours());
        let max_alternatives: usize = env_or("HUDDLE_MAX_ALTERNATIVES", defaults.max_alternatives);
        let timeout_ms: u64 = env_or("HUDDLE_STORE_TIMEOUT_MS", defaults.store_timeout.as_millis() as u64);
        Self {
            search_horizon: TimeDelta::hours(horizon_hours.clamp(1, MAX_SEARCH_HORIZON_HOURS)),
            max_alternatives: max_alternatives.min(MAX_ALTERNATIVES),
            store_timeout: Duration::from_millis(timeout_ms.max(1)),
        }
    }
}

/// Settings for the `huddle` binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind: std::env::var("HUDDLE_BIND").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("HUDDLE_PORT", 7878),
            data_dir: PathBuf::from(
                std::env::var("HUDDLE_DATA_DIR").unwrap_or_else(|_| "./data".into()),
            ),
            max_connections: env_or("HUDDLE_MAX_CONNECTIONS", 256),
            compact_threshold: env_or("HUDDLE_COMPACT_THRESHOLD", 1000),
            metrics_port: std::env::var("HUDDLE_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
            engine: EngineConfig::from_env(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("huddle.wal")
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
