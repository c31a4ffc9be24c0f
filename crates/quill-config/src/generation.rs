use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Configuration {
    pub provider: SmolStr,
    pub model_name: SmolStr,
    /// Cache outputs per job ID inside the process
    pub deduplicate: bool,
    pub dedup_ttl_secs: u64,
    /// Artificial latency of the template provider
    pub simulated_latency_ms: u64,
}

impl Configuration {
    #[must_use]
    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    #[must_use]
    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            provider: "template".into(),
            model_name: "template-v1".into(),
            deduplicate: false,
            dedup_ttl_secs: 10 * 60,
            simulated_latency_ms: 0,
        }
    }
}
