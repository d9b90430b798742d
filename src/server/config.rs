use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::monitoring::probe::DEFAULT_PROBE_TIMEOUT_SECS;
use crate::monitoring::scheduler::DEFAULT_TICK_SECS;
use crate::monitoring::worker_pool::DEFAULT_POOL_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub database_url: Option<String>,
    pub tick_interval_secs: u64,
    pub worker_pool_size: usize,
    pub probe_timeout_secs: u64,
    pub log_dir: String,
    pub stats_window_hours: i64,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialMonitorConfig {
    database_url: Option<String>,
    tick_interval_secs: Option<u64>,
    worker_pool_size: Option<usize>,
    probe_timeout_secs: Option<u64>,
    log_dir: Option<String>,
    stats_window_hours: Option<i64>,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            tick_interval_secs: DEFAULT_TICK_SECS,
            worker_pool_size: DEFAULT_POOL_SIZE,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            log_dir: default_log_dir(),
            stats_window_hours: 24,
        }
    }
}

impl MonitorConfig {
    /// File first, then environment variables on top, then defaults for anything unset.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path) if path.exists() => read_file(path)?,
            _ => PartialMonitorConfig::default(),
        };
        let env_config: PartialMonitorConfig = envy::from_env()?;

        Self::merge(env_config, file_config)
    }

    fn merge(
        env_config: PartialMonitorConfig,
        file_config: PartialMonitorConfig,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = MonitorConfig {
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .filter(|url| !url.trim().is_empty()),
            tick_interval_secs: env_config
                .tick_interval_secs
                .or(file_config.tick_interval_secs)
                .unwrap_or(defaults.tick_interval_secs),
            worker_pool_size: env_config
                .worker_pool_size
                .or(file_config.worker_pool_size)
                .unwrap_or(defaults.worker_pool_size),
            probe_timeout_secs: env_config
                .probe_timeout_secs
                .or(file_config.probe_timeout_secs)
                .unwrap_or(defaults.probe_timeout_secs),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            stats_window_hours: env_config
                .stats_window_hours
                .or(file_config.stats_window_hours)
                .unwrap_or(defaults.stats_window_hours),
        };

        if config.tick_interval_secs == 0 {
            return Err(ConfigError::Zero("TICK_INTERVAL_SECS"));
        }
        if config.worker_pool_size == 0 {
            return Err(ConfigError::Zero("WORKER_POOL_SIZE"));
        }
        if config.probe_timeout_secs == 0 {
            return Err(ConfigError::Zero("PROBE_TIMEOUT_SECS"));
        }
        Ok(config)
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn stats_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.stats_window_hours.max(1))
    }
}

fn read_file(path: &Path) -> Result<PartialMonitorConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
