#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

/// Duration the delta should be adjusted in
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeltaDirection {
    /// Add to the delta
    Add,

    /// Subtract from the delta
    Sub,
}

/// Handle to adjust the delta of the clock
#[derive(Clone, Debug)]
pub struct MockHandle {
    delta: Arc<AtomicI64>,
}

impl MockHandle {
    /// Adjust the delta by the duration in the direction specified
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn adjust(&self, direction: DeltaDirection, delta: Duration) {
        let mut delta = delta.as_nanos() as i64;
        if direction == DeltaDirection::Sub {
            delta = -delta;
        }

        self.delta.fetch_add(delta, Ordering::AcqRel);
    }

    /// Total delta the clock currently applies, in nanoseconds
    #[must_use]
    pub fn delta(&self) -> i64 {
        self.delta.load(Ordering::Acquire)
    }
}

/// Clock with an optional adjustable delta
#[derive(Clone, Debug, Default)]
pub struct Clock {
    delta: Option<Arc<AtomicI64>>,
}

impl Clock {
    /// Construct a new clock without an internal delta
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a mockable clock
    ///
    /// This clock returns a handle which you can use to adjust the delta
    #[must_use]
    pub fn mockable() -> (Self, MockHandle) {
        let delta = Arc::new(AtomicI64::default());

        let mock_handle = MockHandle {
            delta: Arc::clone(&delta),
        };
        let clock = Self { delta: Some(delta) };

        (clock, mock_handle)
    }

    /// Read the current time from the system clock and apply the delta
    #[must_use]
    pub fn now(&self) -> SystemTime {
        let mut now = SystemTime::now();

        if let Some(ref delta) = self.delta {
            let ns_delta = delta.load(Ordering::Acquire);
            if ns_delta.is_positive() {
                now += Duration::from_nanos(ns_delta.unsigned_abs());
            } else {
                now -= Duration::from_nanos(ns_delta.unsigned_abs());
            }
        }

        now
    }

    /// Duration elapsed since `earlier`, saturating to zero if `earlier` lies in the future
    #[must_use]
    pub fn elapsed_since(&self, earlier: SystemTime) -> Duration {
        self.now().duration_since(earlier).unwrap_or_default()
    }

    /// Sleep for the given duration
    ///
    /// On a mocked clock this moves the delta forward instead and yields once to the runtime
    pub async fn sleep(&self, duration: Duration) {
        if let Some(ref delta) = self.delta {
            MockHandle {
                delta: Arc::clone(delta),
            }
            .adjust(DeltaDirection::Add, duration);

            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(duration).await;
        }
    }
}
