use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Configuration {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Configuration {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            interval_ms: 1500,
            max_attempts: 400,
        }
    }
}
