// ABOUTME: Bounded waits used during the upgrade.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    /// Upper bound for initdb, pg_upgrade and analyze.
    #[serde(default = "default_command", with = "humantime_serde")]
    pub command: Duration,

    /// Liveness probes after starting the database.
    #[serde(default = "default_start_attempts")]
    pub start_attempts: u32,

    #[serde(default = "default_start_interval", with = "humantime_serde")]
    pub start_interval: Duration,

    /// Pause before maintenance mode when `--wait` is given.
    #[serde(default = "default_settle_wait", with = "humantime_serde")]
    pub settle_wait: Duration,
}

fn default_command() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_start_attempts() -> u32 {
    30
}

fn default_start_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_settle_wait() -> Duration {
    Duration::from_secs(30)
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        TimeoutsConfig {
            command: default_command(),
            start_attempts: default_start_attempts(),
            start_interval: default_start_interval(),
            settle_wait: default_settle_wait(),
        }
    }
}
