//! Configuration file support for flowstatsyncd
//!
//! Loads and validates daemon configuration from TOML files.
//! Default location: /etc/fsfw/flowstatsyncd.conf

use crate::error::{FlowStatError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fsfw/flowstatsyncd.conf";

/// Poll cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Bounded wait for a single stats request, in seconds
    #[serde(default = "default_stats_timeout")]
    pub stats_timeout_secs: u64,

    /// Maximum switches polled concurrently within one cycle
    #[serde(default = "default_max_concurrent_polls")]
    pub max_concurrent_polls: usize,
}

/// Cache persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path of the persisted cache image
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
}

/// Complete flowstatsyncd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowstatConfig {
    /// Poll cycle configuration
    #[serde(default)]
    pub polling: PollingConfig,

    /// Cache persistence configuration
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

// Default functions
fn default_poll_interval() -> u64 {
    10
}

fn default_stats_timeout() -> u64 {
    10
}

fn default_max_concurrent_polls() -> usize {
    8
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("/var/run/flowstatsyncd/flow-cache.json")
}

// Default implementations
impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            stats_timeout_secs: default_stats_timeout(),
            max_concurrent_polls: default_max_concurrent_polls(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            cache_file: default_cache_file(),
        }
    }
}

impl FlowstatConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config: FlowstatConfig = toml::from_str(&content).map_err(|e| {
                    FlowStatError::Configuration(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "flowstatsyncd: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(FlowStatError::Io(e)),
        }
    }

    /// Get the poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.poll_interval_secs)
    }

    /// Get the per-request stats timeout as Duration
    pub fn stats_timeout(&self) -> Duration {
        Duration::from_secs(self.polling.stats_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.polling.poll_interval_secs == 0 {
            return Err(FlowStatError::Configuration(
                "poll_interval_secs must be >= 1".to_string(),
            ));
        }

        if self.polling.stats_timeout_secs == 0 {
            return Err(FlowStatError::Configuration(
                "stats_timeout_secs must be >= 1".to_string(),
            ));
        }

        if self.polling.max_concurrent_polls == 0 {
            return Err(FlowStatError::Configuration(
                "max_concurrent_polls must be >= 1".to_string(),
            ));
        }

        if self.persistence.cache_file.file_name().is_none() {
            return Err(FlowStatError::Configuration(format!(
                "cache_file {} has no file name",
                self.persistence.cache_file.display()
            )));
        }

        Ok(())
    }
}
