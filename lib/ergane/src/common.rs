use crate::{
    error::{BoxError, Error, Result},
    Completion, ContextFor, JobContextFor, JobContextRepository, JobData, JobQueue, JobResult,
    Outcome, RunInfo, Runnable,
};
use ahash::AHashMap;
use futures_util::{future::BoxFuture, FutureExt, TryStreamExt};
use just_retry::RetryExt;
use std::{pin::pin, sync::Arc};
use tokio::{task::JoinSet, time::Instant};
use uuid::Uuid;

const MISSING_CONTEXT: &str = "missing job context";

/// Claim up to `max_jobs` jobs and spawn them onto the join set
///
/// Returns the amount of jobs that were spawned
pub fn spawn_jobs<'a, Q>(
    queue: &'a Q,
    max_jobs: usize,
    run_ctx: Arc<ContextFor<Q>>,
    join_set: &'a mut JoinSet<()>,
) -> BoxFuture<'a, Result<usize>>
where
    Q: JobQueue + Clone,
{
    async move { spawn_jobs_inner(queue, max_jobs, run_ctx, join_set).await }.boxed()
}

async fn spawn_jobs_inner<Q>(
    queue: &Q,
    max_jobs: usize,
    run_ctx: Arc<ContextFor<Q>>,
    join_set: &mut JoinSet<()>,
) -> Result<usize>
where
    Q: JobQueue + Clone,
{
    let job_data = queue.fetch_job_data(max_jobs).await?;
    if job_data.is_empty() {
        return Ok(0);
    }

    let job_ids: Vec<Uuid> = job_data.iter().map(|data| data.job_id).collect();
    let context_stream = queue
        .context_repository()
        .fetch_context(job_ids.into_iter())
        .await
        .map_err(|err| Error::ContextRepository(err.into()))?;
    let mut context_stream = pin!(context_stream);

    // The repository doesn't have to return the contexts in order
    let mut job_data = job_data
        .into_iter()
        .map(|data| (data.job_id, data))
        .collect::<AHashMap<Uuid, JobData>>();

    let mut spawned = 0;
    while let Some((job_id, job_ctx)) = context_stream
        .try_next()
        .await
        .map_err(|err| Error::ContextRepository(err.into()))?
    {
        let Some(data) = job_data.remove(&job_id) else {
            continue;
        };

        join_set.spawn(run_job(queue.clone(), data, job_ctx, Arc::clone(&run_ctx)));
        spawned += 1;
    }

    for data in job_data.into_values() {
        error!(queue = queue.queue_name(), job_id = %data.job_id, "{MISSING_CONTEXT}");

        let job_result = JobResult {
            job_data: &data,
            outcome: Outcome::Fail {
                error: MISSING_CONTEXT.into(),
            },
        };
        queue.complete_job(&job_result).await?;
    }

    Ok(spawned)
}

// Boxed to keep the spawned future `Send` at concrete call sites
fn run_job<Q>(
    queue: Q,
    job_data: JobData,
    job_ctx: JobContextFor<Q>,
    run_ctx: Arc<ContextFor<Q>>,
) -> BoxFuture<'static, ()>
where
    Q: JobQueue,
{
    async move { run_job_inner(queue, job_data, job_ctx, run_ctx).await }.boxed()
}

async fn run_job_inner<Q>(
    queue: Q,
    job_data: JobData,
    job_ctx: JobContextFor<Q>,
    run_ctx: Arc<ContextFor<Q>>,
) where
    Q: JobQueue,
{
    let job_id = job_data.job_id;
    let (run_info, mut progress_rx) =
        RunInfo::new(job_id, job_data.attempts_made + 1, queue.max_attempts());

    let tick_period = queue.lease_duration() / 2;
    let mut heartbeat = tokio::time::interval_at(Instant::now() + tick_period, tick_period);

    let result = {
        let mut run_fut = pin!(job_ctx.run(&run_ctx, &run_info));

        loop {
            tokio::select! {
                result = &mut run_fut => break result,
                _ = heartbeat.tick() => {
                    if let Err(error) = (|| queue.reclaim_job(&job_data))
                        .retry(just_retry::backoff_policy())
                        .await
                    {
                        error!(?error, %job_id, "failed to renew lease");
                    }
                }
                Ok(()) = progress_rx.changed() => {
                    let progress = *progress_rx.borrow_and_update();
                    if let Err(error) = queue.update_progress(&job_data, progress).await {
                        warn!(?error, %job_id, "failed to update progress");
                    }
                }
            }
        }
    };

    let outcome = match result {
        Ok(output) => match serde_json::to_value(output) {
            Ok(output) => Outcome::Success { output },
            Err(error) => Outcome::Fail {
                error: format!("failed to serialise job output: {error}"),
            },
        },
        Err(error) => {
            let error: BoxError = error.into();
            warn!(%job_id, attempt = run_info.attempt, %error, "job run failed");

            Outcome::Fail {
                error: error.to_string(),
            }
        }
    };

    let last_error = match outcome {
        Outcome::Fail { ref error } => Some(error.clone()),
        Outcome::Success { .. } => None,
    };
    let job_result = JobResult {
        job_data: &job_data,
        outcome,
    };

    let completion = match (|| queue.complete_job(&job_result))
        .retry(just_retry::backoff_policy())
        .await
    {
        Ok(completion) => completion,
        Err(error) => {
            error!(?error, %job_id, "failed to report job outcome");
            return;
        }
    };

    match completion {
        Completion::Completed { attempts } => debug!(%job_id, attempts, "job completed"),
        Completion::Retrying { attempts, .. } => {
            info!(%job_id, attempts, "job scheduled for another attempt");
        }
        Completion::Exhausted { attempts } => {
            error!(%job_id, attempts, "job failed permanently");

            let error = last_error.as_deref().unwrap_or_default();
            job_ctx.on_exhausted(&run_ctx, &run_info, error).await;
        }
        Completion::Discarded => warn!(%job_id, "claim was lost, outcome discarded"),
    }
}
