#[macro_use]
extern crate tracing;

use ergane::JobQueue;
use just_retry::{
    retry_policies::{policies::ExponentialBackoff, Jitter},
    JustRetryPolicy, StartTime,
};
use quill_config::job_queue::Configuration;
use quill_jobs::JobRunnerContext;
use std::{num::NonZero, ops::ControlFlow, sync::Arc, time::Duration};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

pub use self::queue::{prepare_job_queues, AnyQueue, JobQueues};

mod queue;

const EXECUTION_TIMEOUT_DURATION: Duration = Duration::from_secs(30);
const MIN_ERROR_BACKOFF: Duration = Duration::from_millis(100);
const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(30);

fn error_backoff_policy() -> ExponentialBackoff {
    ExponentialBackoff::builder()
        .retry_bounds(MIN_ERROR_BACKOFF, MAX_ERROR_BACKOFF)
        .jitter(Jitter::Bounded)
        .build_with_max_retries(u32::MAX)
}

fn log_join_result(result: Result<(), JoinError>) {
    if let Err(error) = result {
        error!(?error, "job task panicked");
    }
}

/// Keep up to `num_workers` jobs of the queue running until the token is cancelled
///
/// In-flight jobs get [`EXECUTION_TIMEOUT_DURATION`] to finish after cancellation,
/// whatever is still running afterwards is aborted and will be requeued once its lease expires
#[instrument(skip_all, fields(queue = %queue.queue_name()))]
pub async fn run_dispatcher(
    queue: AnyQueue,
    ctx: Arc<JobRunnerContext>,
    num_workers: NonZero<usize>,
    shutdown: CancellationToken,
) {
    let backoff_policy = error_backoff_policy();
    let mut n_past_errors = 0;
    let mut job_joinset = JoinSet::new();

    info!(num_workers = num_workers.get(), "starting dispatcher");

    while !shutdown.is_cancelled() {
        while let Some(result) = job_joinset.try_join_next() {
            log_join_result(result);
        }

        let free_slots = num_workers.get() - job_joinset.len();
        if free_slots == 0 {
            tokio::select! {
                () = shutdown.cancelled() => break,
                Some(result) = job_joinset.join_next() => {
                    log_join_result(result);
                    continue;
                }
            }
        }

        let result =
            ergane::spawn_jobs(&queue, free_slots, Arc::clone(&ctx), &mut job_joinset).await;

        match result {
            Ok(..) => n_past_errors = 0,
            Err(error) => {
                let ControlFlow::Continue(delay) =
                    backoff_policy.should_retry(StartTime::Irrelevant, n_past_errors)
                else {
                    error!(?error, "queue backend keeps failing, stopping dispatcher");
                    break;
                };

                error!(?error, retry_in = ?delay, "failed to spawn jobs");
                n_past_errors = n_past_errors.saturating_add(1);

                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    info!(in_flight = job_joinset.len(), "draining dispatcher");

    let drained = tokio::time::timeout(EXECUTION_TIMEOUT_DURATION, async {
        while let Some(result) = job_joinset.join_next().await {
            log_join_result(result);
        }
    })
    .await
    .is_ok();

    if !drained {
        warn!(
            remaining = job_joinset.len(),
            "jobs didn't finish within the grace period, aborting"
        );
        job_joinset.shutdown().await;
    }
}

/// Both generation queues and the dispatchers draining them
pub struct JobSystem {
    queues: JobQueues,
    shutdown: CancellationToken,
    dispatchers: Vec<JoinHandle<()>>,
}

impl JobSystem {
    /// Spawn one dispatcher per queue
    #[must_use]
    pub fn start(queues: JobQueues, ctx: JobRunnerContext, config: &Configuration) -> Self {
        let ctx = Arc::new(ctx);
        let shutdown = CancellationToken::new();

        let dispatchers = [
            (queues.text.clone(), config.text.num_workers),
            (queues.image.clone(), config.image.num_workers),
        ]
        .into_iter()
        .map(|(queue, num_workers)| {
            tokio::spawn(run_dispatcher(
                queue,
                Arc::clone(&ctx),
                num_workers,
                shutdown.child_token(),
            ))
        })
        .collect();

        Self {
            queues,
            shutdown,
            dispatchers,
        }
    }

    #[must_use]
    pub fn queues(&self) -> &JobQueues {
        &self.queues
    }

    /// Stop claiming new jobs and wait for the dispatchers to drain
    pub async fn shutdown(self) {
        self.shutdown.cancel();

        for dispatcher in self.dispatchers {
            if let Err(error) = dispatcher.await {
                error!(?error, "dispatcher task failed");
            }
        }
    }
}

