//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep between polls when nothing is due, in seconds (fractional allowed)
    #[serde(rename = "poll-interval-secs")]
    pub poll_interval_secs: f64,

    /// Ask the work queue to track status of dispatched jobs
    #[serde(rename = "track-status")]
    pub track_status: bool,

    /// Register the built-in hook that logs every dispatch
    #[serde(rename = "log-dispatches")]
    pub log_dispatches: bool,
}

/// Used whenever the configured interval is unusable
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 5.0;

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            track_status: false,
            log_dispatches: false,
        }
    }
}

impl SchedulerConfig {
    /// Get the poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECS))
    }

    /// Check that the interval is a positive, finite number of seconds
    pub fn validate(&self) -> eyre::Result<()> {
        if !self.poll_interval_secs.is_finite() || self.poll_interval_secs <= 0.0 {
            return Err(eyre::eyre!(
                "poll-interval-secs must be a positive number, got {}",
                self.poll_interval_secs
            ));
        }
        Ok(())
    }
}
