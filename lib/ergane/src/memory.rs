use crate::{
    consts::{BLOCK_TIME, LEASE_DURATION, MAX_ATTEMPTS},
    error::{Error, Result},
    Backoff, Completion, JobContextRepository, JobData, JobDetails, JobQueue, JobResult,
    JobSnapshot, JobState, Outcome, Retention, Runnable,
};
use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use futures_util::{
    stream::{self, BoxStream},
    StreamExt,
};
use smol_str::SmolStr;
use std::{
    collections::{BTreeSet, VecDeque},
    convert::Infallible,
    pin::pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    time::{Duration, SystemTime},
};
use tick_tock_mock::Clock;
use tokio::sync::Notify;
use typed_builder::TypedBuilder;
use uuid::Uuid;

struct Lease {
    claim_id: u64,
    expires_at: SystemTime,
}

struct Entry {
    snapshot: JobSnapshot,
    lease: Option<Lease>,
    last_claim_id: Option<u64>,
}

#[derive(Default)]
struct State {
    jobs: AHashMap<Uuid, Entry>,
    waiting: VecDeque<Uuid>,
    delayed: BTreeSet<(SystemTime, u64, Uuid)>,
    active: AHashSet<Uuid>,
    /// IDs whose context is being stored, not yet visible as jobs
    reserved: AHashSet<Uuid>,
    completed: VecDeque<Uuid>,
    failed: VecDeque<Uuid>,
    next_seq: u64,
}

impl State {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Put jobs whose lease ran out back at the front of the waiting list
    fn requeue_stalled(&mut self, queue_name: &str, now: SystemTime) {
        let mut stalled: Vec<(SystemTime, Uuid)> = self
            .active
            .iter()
            .filter_map(|job_id| {
                let entry = self.jobs.get(job_id)?;
                let lease = entry.lease.as_ref()?;
                (lease.expires_at <= now).then_some((entry.snapshot.created_at, *job_id))
            })
            .collect();

        // Oldest job ends up first
        stalled.sort_unstable();

        for (_, job_id) in stalled.into_iter().rev() {
            self.active.remove(&job_id);
            if let Some(entry) = self.jobs.get_mut(&job_id) {
                warn!(queue = queue_name, %job_id, "lease expired, requeueing stalled job");
                entry.lease = None;
                entry.snapshot.state = JobState::Waiting;
                self.waiting.push_front(job_id);
            }
        }
    }

    fn promote_due(&mut self, now: SystemTime) {
        while self
            .delayed
            .first()
            .is_some_and(|(run_at, ..)| *run_at <= now)
        {
            let Some((_, _, job_id)) = self.delayed.pop_first() else {
                break;
            };

            if let Some(entry) = self.jobs.get_mut(&job_id) {
                entry.snapshot.state = JobState::Waiting;
                self.waiting.push_back(job_id);
            }
        }
    }

    fn claim(&mut self, max_jobs: usize, now: SystemTime, lease_duration: Duration) -> Vec<JobData> {
        let mut claimed = Vec::with_capacity(max_jobs.min(self.waiting.len()));

        while claimed.len() < max_jobs {
            let Some(job_id) = self.waiting.pop_front() else {
                break;
            };

            let claim_id = self.next_seq();
            let Some(entry) = self.jobs.get_mut(&job_id) else {
                continue;
            };

            entry.snapshot.state = JobState::Active;
            entry.snapshot.processed_at = Some(now);
            entry.lease = Some(Lease {
                claim_id,
                expires_at: now + lease_duration,
            });
            entry.last_claim_id = Some(claim_id);
            self.active.insert(job_id);

            claimed.push(JobData {
                job_id,
                attempts_made: entry.snapshot.attempts_made,
                claim_id,
            });
        }

        claimed
    }

    fn next_due(&self) -> Option<SystemTime> {
        self.delayed.first().map(|(run_at, ..)| *run_at)
    }

    fn prune(&mut self, retention: Retention) {
        while self.completed.len() > retention.keep_completed {
            if let Some(job_id) = self.completed.pop_front() {
                self.jobs.remove(&job_id);
            }
        }

        while self.failed.len() > retention.keep_failed {
            if let Some(job_id) = self.failed.pop_front() {
                self.jobs.remove(&job_id);
            }
        }
    }
}

/// Job queue keeping its state inside the process
///
/// Semantically equivalent to the Redis-backed queue, minus the durability
#[derive(TypedBuilder)]
pub struct InMemoryJobQueue<CR> {
    #[builder(setter(into))]
    context_repository: Arc<CR>,
    #[builder(setter(into))]
    queue_name: SmolStr,
    #[builder(default = MAX_ATTEMPTS)]
    max_attempts: u32,
    #[builder(default)]
    backoff: Backoff,
    #[builder(default)]
    retention: Retention,
    #[builder(default = LEASE_DURATION)]
    lease_duration: Duration,
    #[builder(default = BLOCK_TIME)]
    block_time: Duration,
    #[builder(default)]
    clock: Clock,

    #[builder(default, setter(skip))]
    state: Arc<Mutex<State>>,
    #[builder(default, setter(skip))]
    notify: Arc<Notify>,
}

impl<CR> InMemoryJobQueue<CR> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_claim(&self, max_jobs: usize) -> (Vec<JobData>, Option<SystemTime>) {
        let now = self.clock.now();
        let mut state = self.lock();

        state.requeue_stalled(&self.queue_name, now);
        state.promote_due(now);
        let claimed = state.claim(max_jobs, now, self.lease_duration);

        (claimed, state.next_due())
    }
}

#[async_trait]
impl<CR> JobQueue for InMemoryJobQueue<CR>
where
    CR: JobContextRepository + Send + Sync + 'static,
{
    type ContextRepository = CR;

    fn context_repository(&self) -> &Self::ContextRepository {
        &self.context_repository
    }

    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    async fn enqueue(&self, job_details: JobDetails<CR::JobContext>) -> Result<()> {
        let JobDetails {
            context,
            job_id,
            run_at,
        } = job_details;

        {
            let mut state = self.lock();
            if state.jobs.contains_key(&job_id) || !state.reserved.insert(job_id) {
                return Err(Error::DuplicateJob(job_id));
            }
        }

        let stored = self.context_repository.store_context(job_id, context).await;

        let now = self.clock.now();
        {
            let mut state = self.lock();
            state.reserved.remove(&job_id);
            stored.map_err(|err| Error::ContextRepository(err.into()))?;

            let delayed_until = run_at.filter(|run_at| *run_at > now);
            let job_state = if let Some(run_at) = delayed_until {
                let seq = state.next_seq();
                state.delayed.insert((run_at, seq, job_id));
                JobState::Delayed
            } else {
                state.waiting.push_back(job_id);
                JobState::Waiting
            };

            state.jobs.insert(
                job_id,
                Entry {
                    snapshot: JobSnapshot {
                        job_id,
                        state: job_state,
                        attempts_made: 0,
                        progress: 0,
                        output: None,
                        failed_reason: None,
                        created_at: now,
                        processed_at: None,
                        finished_at: None,
                    },
                    lease: None,
                    last_claim_id: None,
                },
            );
        }

        debug!(queue = %self.queue_name, %job_id, "enqueued job");
        self.notify.notify_waiters();

        Ok(())
    }

    async fn fetch_job_data(&self, max_jobs: usize) -> Result<Vec<JobData>> {
        let mut notified = pin!(self.notify.notified());
        notified.as_mut().enable();

        let (claimed, next_due) = self.try_claim(max_jobs);
        if !claimed.is_empty() || max_jobs == 0 {
            return Ok(claimed);
        }

        let wait = next_due.map_or(self.block_time, |run_at| {
            run_at
                .duration_since(self.clock.now())
                .unwrap_or_default()
                .min(self.block_time)
        });
        let _ = tokio::time::timeout(wait, notified).await;

        Ok(self.try_claim(max_jobs).0)
    }

    async fn reclaim_job(&self, job_data: &JobData) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.lock();

        let lease = state
            .jobs
            .get_mut(&job_data.job_id)
            .and_then(|entry| entry.lease.as_mut())
            .filter(|lease| lease.claim_id == job_data.claim_id);

        if let Some(lease) = lease {
            lease.expires_at = now + self.lease_duration;
        } else {
            debug!(job_id = %job_data.job_id, "claim lost, lease not renewed");
        }

        Ok(())
    }

    async fn update_progress(&self, job_data: &JobData, progress: u8) -> Result<()> {
        let mut state = self.lock();
        if let Some(entry) = state.jobs.get_mut(&job_data.job_id) {
            let holds_claim = entry
                .lease
                .as_ref()
                .is_some_and(|lease| lease.claim_id == job_data.claim_id);

            if holds_claim {
                entry.snapshot.progress = progress.min(100);
            }
        }

        Ok(())
    }

    async fn complete_job(&self, state: &JobResult<'_>) -> Result<Completion> {
        let job_id = state.job_data.job_id;
        let claim_id = state.job_data.claim_id;
        let now = self.clock.now();

        let completion = {
            let mut queue_state = self.lock();
            let Some(entry) = queue_state.jobs.get_mut(&job_id) else {
                return Ok(Completion::Discarded);
            };

            let holds_claim = match entry.snapshot.state {
                JobState::Active => entry
                    .lease
                    .as_ref()
                    .is_some_and(|lease| lease.claim_id == claim_id),
                // Stalled and requeued, but nobody picked it up again yet
                JobState::Waiting => entry.last_claim_id == Some(claim_id),
                _ => false,
            };

            if !holds_claim {
                return Ok(Completion::Discarded);
            }

            let was_waiting = entry.snapshot.state == JobState::Waiting;
            entry.lease = None;
            entry.snapshot.attempts_made += 1;
            let attempts = entry.snapshot.attempts_made;

            let completion = match &state.outcome {
                Outcome::Success { output } => {
                    entry.snapshot.state = JobState::Completed;
                    entry.snapshot.output = Some(output.clone());
                    entry.snapshot.progress = 100;
                    entry.snapshot.finished_at = Some(now);
                    Completion::Completed { attempts }
                }
                Outcome::Fail { error } => {
                    entry.snapshot.failed_reason = Some(error.clone());

                    if attempts < self.max_attempts {
                        let run_at = now + self.backoff.delay(attempts);
                        entry.snapshot.state = JobState::Delayed;
                        Completion::Retrying { attempts, run_at }
                    } else {
                        entry.snapshot.state = JobState::Failed;
                        entry.snapshot.finished_at = Some(now);
                        Completion::Exhausted { attempts }
                    }
                }
            };

            queue_state.active.remove(&job_id);
            if was_waiting {
                queue_state.waiting.retain(|waiting_id| *waiting_id != job_id);
            }

            match completion {
                Completion::Completed { .. } => {
                    queue_state.completed.push_back(job_id);
                    queue_state.prune(self.retention);
                }
                Completion::Exhausted { .. } => {
                    queue_state.failed.push_back(job_id);
                    queue_state.prune(self.retention);
                }
                Completion::Retrying { run_at, .. } => {
                    let seq = queue_state.next_seq();
                    queue_state.delayed.insert((run_at, seq, job_id));
                }
                Completion::Discarded => {}
            }

            completion
        };

        match completion {
            Completion::Completed { .. } | Completion::Exhausted { .. } => {
                self.context_repository
                    .remove_context(job_id)
                    .await
                    .map_err(|err| Error::ContextRepository(err.into()))?;
            }
            Completion::Retrying { .. } => self.notify.notify_waiters(),
            Completion::Discarded => {}
        }

        Ok(completion)
    }

    async fn job_state(&self, job_id: Uuid) -> Result<Option<JobSnapshot>> {
        Ok(self
            .lock()
            .jobs
            .get(&job_id)
            .map(|entry| entry.snapshot.clone()))
    }
}

impl<CR> Clone for InMemoryJobQueue<CR> {
    fn clone(&self) -> Self {
        Self {
            context_repository: Arc::clone(&self.context_repository),
            queue_name: self.queue_name.clone(),
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            retention: self.retention,
            lease_duration: self.lease_duration,
            block_time: self.block_time,
            clock: self.clock.clone(),
            state: Arc::clone(&self.state),
            notify: Arc::clone(&self.notify),
        }
    }
}

/// Context repository keeping the job contexts in a map
pub struct InMemoryContextRepository<C> {
    contexts: RwLock<AHashMap<Uuid, C>>,
}

impl<C> InMemoryContextRepository<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C> Default for InMemoryContextRepository<C> {
    fn default() -> Self {
        Self {
            contexts: RwLock::new(AHashMap::new()),
        }
    }
}

impl<C> JobContextRepository for InMemoryContextRepository<C>
where
    C: Runnable + Clone + Send + Sync + 'static,
{
    type JobContext = C;
    type Error = Infallible;
    type Stream = BoxStream<'static, Result<(Uuid, Self::JobContext), Self::Error>>;

    async fn fetch_context<I>(&self, job_ids: I) -> Result<Self::Stream, Self::Error>
    where
        I: Iterator<Item = Uuid> + Send + 'static,
    {
        let found: Vec<_> = {
            let contexts = self.contexts.read().unwrap_or_else(PoisonError::into_inner);
            job_ids
                .filter_map(|job_id| {
                    contexts
                        .get(&job_id)
                        .map(|context| Ok((job_id, context.clone())))
                })
                .collect()
        };

        Ok(stream::iter(found).boxed())
    }

    async fn remove_context(&self, job_id: Uuid) -> Result<(), Self::Error> {
        self.contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);

        Ok(())
    }

    async fn store_context(&self, job_id: Uuid, context: Self::JobContext) -> Result<(), Self::Error> {
        self.contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, context);

        Ok(())
    }
}
