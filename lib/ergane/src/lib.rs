#[macro_use]
extern crate tracing;

use async_trait::async_trait;
use futures_util::{Future, Stream};
use serde::Serialize;
use std::{sync::Arc, time::Duration, time::SystemTime};
use tokio::sync::watch;
use typed_builder::TypedBuilder;
use uuid::Uuid;

pub use self::{
    common::spawn_jobs,
    error::{BoxError, Error, Result},
    memory::{InMemoryContextRepository, InMemoryJobQueue},
    policy::{Backoff, Retention},
    snapshot::{JobSnapshot, JobState},
};

#[cfg(feature = "redis")]
pub use self::redis::RedisJobQueue;

pub mod consts;

mod common;
mod error;
mod memory;
mod policy;
#[cfg(feature = "redis")]
mod redis;
mod snapshot;

/// Job context type stored inside the context repository of the queue
pub type JobContextFor<Q> =
    <<Q as JobQueue>::ContextRepository as JobContextRepository>::JobContext;

/// Run context type that gets passed to every job of the queue
pub type ContextFor<Q> = <JobContextFor<Q> as Runnable>::Context;

pub trait Runnable {
    /// User-defined context that is getting passed to the job when run
    ///
    /// This way you can reference services, configurations, etc.
    type Context: Send + Sync + 'static;

    /// Output of a successful run, kept by the queue until the job is pruned
    type Output: Serialize + Send;

    type Error: Into<BoxError> + Send;

    /// Run the job
    fn run(
        &self,
        ctx: &Self::Context,
        run: &RunInfo,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;

    /// Called once after the final attempt failed and the queue gave up on the job
    fn on_exhausted(
        &self,
        ctx: &Self::Context,
        run: &RunInfo,
        error: &str,
    ) -> impl Future<Output = ()> + Send;
}

pub trait JobContextRepository {
    /// Some job context
    ///
    /// To support multiple job types per repository, consider using the enum dispatch technique
    type JobContext: Runnable + Send + Sync + 'static;
    type Error: Into<BoxError> + Send;
    type Stream: Stream<Item = Result<(Uuid, Self::JobContext), Self::Error>> + Send;

    /// Batch fetch job contexts
    ///
    /// The stream has to return `([Job ID], [Job context])`, this gives you the advantage that the order isn't enforced.
    /// You can return them as you find them
    fn fetch_context<I>(
        &self,
        job_ids: I,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send
    where
        I: Iterator<Item = Uuid> + Send + 'static;

    /// Remove job context from the database
    fn remove_context(&self, job_id: Uuid) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Store job context into the database
    ///
    /// Make sure the job can be efficiently found via the job ID (such as using the job ID as the primary key of a database table)
    fn store_context(
        &self,
        job_id: Uuid,
        context: Self::JobContext,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

#[derive(TypedBuilder)]
pub struct JobDetails<C> {
    #[builder(setter(into))]
    pub context: C,
    #[builder(default = Uuid::now_v7())]
    pub job_id: Uuid,
    #[builder(default, setter(strip_option))]
    pub run_at: Option<SystemTime>,
}

/// Claim on a job handed out by [`JobQueue::fetch_job_data`]
#[derive(Clone, Debug, PartialEq)]
pub struct JobData {
    pub job_id: Uuid,
    /// Attempts that finished (successfully or not) before this claim
    pub attempts_made: u32,
    /// Identifies this particular claim, a job requeued after its lease expired gets a new one
    pub claim_id: u64,
}

#[derive(Clone, Debug)]
pub enum Outcome {
    Success { output: serde_json::Value },
    Fail { error: String },
}

#[derive(Clone, Debug)]
pub struct JobResult<'a> {
    pub job_data: &'a JobData,
    pub outcome: Outcome,
}

/// What the queue did with a job after its outcome was reported
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Completion {
    /// The job succeeded and is retained as completed
    Completed { attempts: u32 },

    /// The job failed and got rescheduled
    Retrying { attempts: u32, run_at: SystemTime },

    /// The job failed for the last time and is retained as failed
    Exhausted { attempts: u32 },

    /// The job wasn't claimed anymore, the report was ignored
    Discarded,
}

/// Information about the current run of a job
pub struct RunInfo {
    pub job_id: Uuid,
    /// 1-based number of this attempt
    pub attempt: u32,
    pub max_attempts: u32,
    progress: watch::Sender<u8>,
}

impl RunInfo {
    #[must_use]
    pub fn new(job_id: Uuid, attempt: u32, max_attempts: u32) -> (Self, watch::Receiver<u8>) {
        let (progress, progress_rx) = watch::channel(0);
        let info = Self {
            job_id,
            attempt,
            max_attempts,
            progress,
        };

        (info, progress_rx)
    }

    #[must_use]
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Report the progress of the job in percent
    pub fn report_progress(&self, progress: u8) {
        self.progress.send_replace(progress.min(100));
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    type ContextRepository: JobContextRepository + Send + Sync + 'static;

    fn context_repository(&self) -> &Self::ContextRepository;

    fn queue_name(&self) -> &str;

    /// Maximum amount of attempts per job, including the first one
    fn max_attempts(&self) -> u32;

    /// Time after which a claimed job is considered stalled unless its lease was renewed
    fn lease_duration(&self) -> Duration;

    async fn enqueue(
        &self,
        job_details: JobDetails<<Self::ContextRepository as JobContextRepository>::JobContext>,
    ) -> Result<()>;

    /// Claim up to `max_jobs` jobs in FIFO order
    ///
    /// Stalled jobs are put back at the front of the queue before claiming
    async fn fetch_job_data(&self, max_jobs: usize) -> Result<Vec<JobData>>;

    /// Renew the lease of the claim
    async fn reclaim_job(&self, job_data: &JobData) -> Result<()>;

    async fn update_progress(&self, job_data: &JobData, progress: u8) -> Result<()>;

    async fn complete_job(&self, state: &JobResult<'_>) -> Result<Completion>;

    /// Live state of the job, `None` once pruned from the retention or if it never existed
    async fn job_state(&self, job_id: Uuid) -> Result<Option<JobSnapshot>>;
}

#[async_trait]
impl<Q> JobQueue for Arc<Q>
where
    Q: JobQueue + ?Sized,
{
    type ContextRepository = Q::ContextRepository;

    fn context_repository(&self) -> &Self::ContextRepository {
        (**self).context_repository()
    }

    fn queue_name(&self) -> &str {
        (**self).queue_name()
    }

    fn max_attempts(&self) -> u32 {
        (**self).max_attempts()
    }

    fn lease_duration(&self) -> Duration {
        (**self).lease_duration()
    }

    async fn enqueue(
        &self,
        job_details: JobDetails<<Self::ContextRepository as JobContextRepository>::JobContext>,
    ) -> Result<()> {
        (**self).enqueue(job_details).await
    }

    async fn fetch_job_data(&self, max_jobs: usize) -> Result<Vec<JobData>> {
        (**self).fetch_job_data(max_jobs).await
    }

    async fn reclaim_job(&self, job_data: &JobData) -> Result<()> {
        (**self).reclaim_job(job_data).await
    }

    async fn update_progress(&self, job_data: &JobData, progress: u8) -> Result<()> {
        (**self).update_progress(job_data, progress).await
    }

    async fn complete_job(&self, state: &JobResult<'_>) -> Result<Completion> {
        (**self).complete_job(state).await
    }

    async fn job_state(&self, job_id: Uuid) -> Result<Option<JobSnapshot>> {
        (**self).job_state(job_id).await
    }
}
