use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{num::NonZero, time::Duration};

const DEFAULT_NUM_WORKERS: NonZero<usize> = match NonZero::new(2) {
    Some(num) => num,
    None => unreachable!(),
};

fn default_num_workers() -> NonZero<usize> {
    DEFAULT_NUM_WORKERS
}

fn default_max_attempts() -> u32 {
    3
}

fn default_keep_completed() -> usize {
    100
}

fn default_keep_failed() -> usize {
    500
}

fn default_lease_secs() -> u64 {
    30
}

fn default_stuck_after_secs() -> u64 {
    10 * 60
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RedisConfiguration {
    pub redis_url: SmolStr,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum Backend {
    InMemory,
    Redis(RedisConfiguration),
}

/// Settings of a single queue and the worker pool draining it
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct QueueConfiguration {
    #[serde(default = "default_num_workers")]
    pub num_workers: NonZero<usize>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    #[serde(default = "default_keep_completed")]
    pub keep_completed: usize,
    #[serde(default = "default_keep_failed")]
    pub keep_failed: usize,
}

impl QueueConfiguration {
    fn with_backoff_base_ms(backoff_base_ms: u64) -> Self {
        Self {
            num_workers: DEFAULT_NUM_WORKERS,
            max_attempts: default_max_attempts(),
            backoff_base_ms,
            keep_completed: default_keep_completed(),
            keep_failed: default_keep_failed(),
        }
    }

    #[must_use]
    pub fn text() -> Self {
        Self::with_backoff_base_ms(2000)
    }

    #[must_use]
    pub fn image() -> Self {
        Self::with_backoff_base_ms(5000)
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    pub backend: Backend,
    #[serde(default = "QueueConfiguration::text")]
    pub text: QueueConfiguration,
    #[serde(default = "QueueConfiguration::image")]
    pub image: QueueConfiguration,
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    /// Queued jobs without any update for this long are reported as stuck
    #[serde(default = "default_stuck_after_secs")]
    pub stuck_after_secs: u64,
}

impl Configuration {
    #[must_use]
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    #[must_use]
    pub fn stuck_after(&self) -> Duration {
        Duration::from_secs(self.stuck_after_secs)
    }
}
