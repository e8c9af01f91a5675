// ABOUTME: Container health check configuration.
// ABOUTME: In-container HTTP probe parameters with polling defaults.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthcheckConfig {
    #[serde(default = "default_path")]
    pub path: String,

    /// Port the application listens on inside the container.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Wall-clock budget for all attempts together.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            port: default_port(),
            retries: default_retries(),
            interval: default_interval(),
            timeout: default_timeout(),
        }
    }
}

fn default_path() -> String {
    "/".to_string()
}

fn default_port() -> u16 {
    80
}

fn default_retries() -> u32 {
    5
}

fn default_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}
