//! Startup connectivity configuration.

use std::time::Duration;

use serde::Deserialize;

/// Fixed-interval connect loop applied to the database and broker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Total connection attempts before giving up.
    pub connect_attempts: usize,
    /// Delay between attempts, in seconds.
    pub connect_delay_secs: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 12,
            connect_delay_secs: 5,
        }
    }
}

impl StartupConfig {
    pub fn connect_delay(&self) -> Duration {
        Duration::from_secs(self.connect_delay_secs)
    }
}
