use crate::consts::{KEEP_COMPLETED, KEEP_FAILED, MIN_BACKOFF_DURATION};
use std::time::Duration;

/// Delay between a failed attempt and the next one
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Backoff {
    /// Always wait the same amount of time
    Fixed(Duration),

    /// Wait `base * 2^(n - 1)` after the n-th failed attempt
    Exponential { base: Duration },
}

impl Backoff {
    #[must_use]
    pub fn exponential(base: Duration) -> Self {
        Self::Exponential { base }
    }

    /// Delay after `attempts_made` attempts failed
    #[must_use]
    pub fn delay(&self, attempts_made: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { base } => {
                let factor = 2_u32.saturating_pow(attempts_made.saturating_sub(1));
                base.saturating_mul(factor)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(MIN_BACKOFF_DURATION)
    }
}

/// How many terminal jobs the queue keeps around for inspection
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Retention {
    pub keep_completed: usize,
    pub keep_failed: usize,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            keep_completed: KEEP_COMPLETED,
            keep_failed: KEEP_FAILED,
        }
    }
}
