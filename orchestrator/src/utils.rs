//! Build metadata and retry backoff

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::settings::DeploySettings;

/// Version and build stamp of this binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Exponential backoff between retries of a flaky filesystem operation
#[derive(Debug, Clone)]
pub struct CooldownOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for CooldownOptions {
    fn default() -> Self {
        CooldownOptions::from(&DeploySettings::default())
    }
}

impl From<&DeploySettings> for CooldownOptions {
    fn from(settings: &DeploySettings) -> Self {
        Self {
            base_delay: Duration::from_millis(settings.move_base_delay_ms),
            max_delay: Duration::from_secs(10),
            multiplier: settings.move_backoff_multiplier,
        }
    }
}

/// Delay before the retry following 0-based `attempt`, capped at `max_delay`
pub fn calc_exp_backoff(options: &CooldownOptions, attempt: u32) -> Duration {
    let delay = options.base_delay.as_secs_f64() * options.multiplier.powi(attempt as i32);
    Duration::from_secs_f64(delay.min(options.max_delay.as_secs_f64()))
}
