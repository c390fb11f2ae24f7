// ABOUTME: Deploy lock timing and scope configuration.
// ABOUTME: Defaults wait up to an hour and reclaim locks older than 59 minutes.

use serde::Deserialize;
use std::time::Duration;

/// Which deployments share a lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockScope {
    /// One lock for the whole host: `<root>/locks/deploy.lock`.
    #[default]
    Global,
    /// One lock per project directory: `<root>/locks/<short-name>.lock`.
    Project,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockSettings {
    #[serde(default = "default_wait", with = "humantime_serde")]
    pub wait: Duration,

    #[serde(default = "default_stale", with = "humantime_serde")]
    pub stale: Duration,

    #[serde(default = "default_poll", with = "humantime_serde")]
    pub poll: Duration,

    #[serde(default)]
    pub scope: LockScope,
}

fn default_wait() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_stale() -> Duration {
    Duration::from_secs(59 * 60)
}

fn default_poll() -> Duration {
    Duration::from_millis(100)
}

impl Default for LockSettings {
    fn default() -> Self {
        LockSettings {
            wait: default_wait(),
            stale: default_stale(),
            poll: default_poll(),
            scope: LockScope::default(),
        }
    }
}
