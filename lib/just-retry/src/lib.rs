use retry_policies::{
    policies::{ExponentialBackoff, ExponentialBackoffTimed},
    Jitter, RetryDecision, RetryPolicy,
};
use std::{
    fmt::Debug,
    future::Future,
    ops::ControlFlow,
    time::{Duration, SystemTime},
};

pub use retry_policies;

const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(30);
const TOTAL_RETRY_DURATION: Duration = Duration::from_secs(24 * 3600);

/// Start time of the operation that is getting retried
#[derive(Clone, Copy, Debug)]
pub enum StartTime {
    /// The policy only looks at the amount of past retries
    Irrelevant,

    /// The operation started at this point in time
    At(SystemTime),
}

/// Small adapter trait that turns the decision of a [`RetryPolicy`] into a "sleep for this long" value
pub trait JustRetryPolicy {
    fn should_retry(&self, start_time: StartTime, n_past_retries: u32)
        -> ControlFlow<(), Duration>;
}

impl<T> JustRetryPolicy for T
where
    T: RetryPolicy,
{
    fn should_retry(
        &self,
        start_time: StartTime,
        n_past_retries: u32,
    ) -> ControlFlow<(), Duration> {
        let start_time = match start_time {
            StartTime::Irrelevant => SystemTime::now(),
            StartTime::At(time) => time,
        };

        match RetryPolicy::should_retry(self, start_time, n_past_retries) {
            RetryDecision::Retry { execute_after } => ControlFlow::Continue(
                execute_after
                    .duration_since(SystemTime::now())
                    .unwrap_or_default(),
            ),
            RetryDecision::DoNotRetry => ControlFlow::Break(()),
        }
    }
}

pub trait RetryExt<T, E> {
    /// Rerun the future produced by this closure until it succeeds or the policy gives up
    fn retry<P>(self, policy: P) -> impl Future<Output = Result<T, E>> + Send
    where
        P: RetryPolicy + Send + Sync;
}

impl<F, Fut, T, E> RetryExt<T, E> for F
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: Debug + Send,
{
    async fn retry<P>(mut self, policy: P) -> Result<T, E>
    where
        P: RetryPolicy + Send + Sync,
    {
        let start_time = SystemTime::now();
        let mut n_past_retries = 0;

        loop {
            let error = match self().await {
                Ok(val) => break Ok(val),
                Err(error) => error,
            };

            match JustRetryPolicy::should_retry(
                &policy,
                StartTime::At(start_time),
                n_past_retries,
            ) {
                ControlFlow::Continue(delay) => {
                    tracing::error!(?error, retry_in = ?delay, "operation failed, retrying");
                    tokio::time::sleep(delay).await;
                    n_past_retries += 1;
                }
                ControlFlow::Break(()) => break Err(error),
            }
        }
    }
}

/// Backoff policy used for infrastructure calls (queue bookkeeping, backend polling)
///
/// Retries with bounded jitter for up to 24 hours
#[must_use]
pub fn backoff_policy() -> ExponentialBackoffTimed {
    ExponentialBackoff::builder()
        .retry_bounds(MIN_RETRY_INTERVAL, MAX_RETRY_INTERVAL)
        .jitter(Jitter::Bounded)
        .build_with_total_retry_duration(TOTAL_RETRY_DURATION)
}
