//! Harness configuration
//!
//! Timing knobs for the poll loops, loaded from `VST_`-prefixed
//! environment variables with serde defaults. CLI flags override
//! individual values where a subcommand exposes them.

use anyhow::Result;
use harness_lib::{workload::WaitConfig, PollerConfig};
use serde::Deserialize;
use std::time::Duration;

/// Harness timing settings
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessSettings {
    /// Attempt ceiling for the metrics poll
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Metrics poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Delay before the stress command is issued, in seconds
    #[serde(default = "default_stress_start_delay")]
    pub stress_start_delay_secs: u64,

    /// Attempt ceiling for the wait-for-pods loop
    #[serde(default = "default_wait_attempts")]
    pub wait_attempts: u32,

    /// Wait-for-pods interval in seconds
    #[serde(default = "default_wait_interval")]
    pub wait_interval_secs: u64,
}

fn default_max_attempts() -> u32 {
    60
}

fn default_poll_interval() -> u64 {
    5
}

fn default_stress_start_delay() -> u64 {
    5
}

fn default_wait_attempts() -> u32 {
    60
}

fn default_wait_interval() -> u64 {
    2
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            poll_interval_secs: default_poll_interval(),
            stress_start_delay_secs: default_stress_start_delay(),
            wait_attempts: default_wait_attempts(),
            wait_interval_secs: default_wait_interval(),
        }
    }
}

impl HarnessSettings {
    /// Load settings from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("VST"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }

    /// Poller configuration with optional per-invocation overrides.
    pub fn poller_config(
        &self,
        max_attempts: Option<u32>,
        poll_interval_secs: Option<u64>,
    ) -> PollerConfig {
        PollerConfig {
            max_attempts: max_attempts.unwrap_or(self.max_attempts),
            poll_interval: Duration::from_secs(poll_interval_secs.unwrap_or(self.poll_interval_secs)),
            stress_start_delay: Duration::from_secs(self.stress_start_delay_secs),
        }
    }

    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig {
            max_attempts: self.wait_attempts,
            interval: Duration::from_secs(self.wait_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_overrides_beat_settings() {
        let settings = HarnessSettings::default();
        let config = settings.poller_config(Some(3), Some(1));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        // Not overridable per invocation.
        assert_eq!(config.stress_start_delay, Duration::from_secs(5));
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let settings = HarnessSettings::default();
        let config = settings.poller_config(None, None);
        assert_eq!(config.max_attempts, 60);
        assert_eq!(config.poll_interval, Duration::from_secs(5));

        let wait = settings.wait_config();
        assert_eq!(wait.max_attempts, 60);
        assert_eq!(wait.interval, Duration::from_secs(2));
    }
}
