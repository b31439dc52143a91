//! Schedaemon configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::SchedulerConfig;

/// Main Schedaemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Delayed job store
    pub store: StoreConfig,

    /// Scheduler loop settings
    pub scheduler: SchedulerConfig,

    /// Immediate work queue
    #[serde(rename = "work-queue")]
    pub work_queue: WorkQueueConfig,

    /// Worker process management
    pub daemon: DaemonConfig,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate().context("Invalid scheduler configuration")?;
        if self.store.busy_timeout_ms == 0 {
            return Err(eyre::eyre!("store.busy-timeout-ms must be greater than zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// `--config` path, then `./schedaemon.yml`, then
    /// `<config_dir>/schedaemon/config.yml`, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("schedaemon.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("schedaemon").join("config.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Delayed job store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file (supports ~/ prefix)
    pub path: String,

    /// How long a writer waits on a locked database
    #[serde(rename = "busy-timeout-ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: delayqueue::default_store_path().to_string_lossy().into_owned(),
            busy_timeout_ms: delayqueue::DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
        }
    }
}

impl StoreConfig {
    pub fn path(&self) -> PathBuf {
        expand_home(&self.path)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Work queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkQueueConfig {
    /// Directory holding one `<queue>.jsonl` file per queue
    #[serde(rename = "spool-dir")]
    pub spool_dir: String,
}

impl Default for WorkQueueConfig {
    fn default() -> Self {
        let spool_dir = dirs::data_local_dir()
            .map(|d| d.join("schedaemon").join("spool"))
            .unwrap_or_else(|| PathBuf::from("spool"))
            .to_string_lossy()
            .into_owned();
        Self { spool_dir }
    }
}

impl WorkQueueConfig {
    pub fn spool_dir(&self) -> PathBuf {
        expand_home(&self.spool_dir)
    }
}

/// Worker process configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// PID file; the runtime dir default is used when unset
    #[serde(rename = "pid-file")]
    pub pid_file: Option<String>,
}

impl DaemonConfig {
    pub fn pid_file(&self) -> Option<PathBuf> {
        self.pid_file.as_deref().map(expand_home)
    }
}

fn expand_home(path: &str) -> PathBuf {
    path.strip_prefix("~/")
        .and_then(|rest| dirs::home_dir().map(|home| home.join(rest)))
        .unwrap_or_else(|| PathBuf::from(path))
}
