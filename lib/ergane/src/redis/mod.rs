use crate::{
    consts::{LEASE_DURATION, MAX_ATTEMPTS},
    error::{Error, Result},
    Backoff, Completion, JobContextRepository, JobData, JobDetails, JobQueue, JobResult,
    JobSnapshot, JobState, Outcome, Retention,
};
use ahash::AHashMap;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use smol_str::SmolStr;
use std::{
    str::FromStr,
    sync::{Arc, LazyLock},
    time::{Duration, SystemTime},
};
use tick_tock_mock::Clock;
use typed_builder::TypedBuilder;
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

static ENQUEUE: LazyLock<Script> = LazyLock::new(|| Script::new(include_str!("lua/enqueue.lua")));
static FETCH: LazyLock<Script> = LazyLock::new(|| Script::new(include_str!("lua/fetch.lua")));
static COMPLETE: LazyLock<Script> =
    LazyLock::new(|| Script::new(include_str!("lua/complete.lua")));
static RECLAIM: LazyLock<Script> = LazyLock::new(|| Script::new(include_str!("lua/reclaim.lua")));
static PROGRESS: LazyLock<Script> =
    LazyLock::new(|| Script::new(include_str!("lua/progress.lua")));

#[allow(clippy::cast_possible_truncation)]
fn to_millis(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn from_millis(millis: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_millis(millis)
}

#[allow(clippy::cast_possible_truncation)]
fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Job queue backed by Redis
///
/// Every state transition runs as a Lua script, making them atomic
#[derive(TypedBuilder)]
pub struct RedisJobQueue<CR> {
    conn: ConnectionManager,
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
    /// How long to wait before looking again when the queue was empty
    #[builder(default = POLL_INTERVAL)]
    poll_interval: Duration,
    #[builder(default)]
    clock: Clock,
}

impl<CR> RedisJobQueue<CR> {
    fn key(&self, suffix: &str) -> String {
        format!("{}:{suffix}", self.queue_name)
    }

    fn job_prefix(&self) -> String {
        self.key("job:")
    }

    fn job_key(&self, job_id: Uuid) -> String {
        format!("{}{job_id}", self.job_prefix())
    }

    async fn try_claim(&self, max_jobs: usize) -> Result<Vec<JobData>> {
        let mut conn = self.conn.clone();
        let (claimed, stalled): (Vec<(String, u32, u64)>, usize) = FETCH
            .key(self.key("wait"))
            .key(self.key("delayed"))
            .key(self.key("active"))
            .key(self.key("claim-seq"))
            .arg(to_millis(self.clock.now()))
            .arg(duration_millis(self.lease_duration))
            .arg(max_jobs)
            .arg(self.job_prefix())
            .invoke_async(&mut conn)
            .await?;

        if stalled > 0 {
            warn!(queue = %self.queue_name, stalled, "requeued stalled jobs");
        }

        claimed
            .into_iter()
            .map(|(job_id, attempts_made, claim_id)| {
                let job_id = Uuid::from_str(&job_id)
                    .map_err(|_| Error::MalformedJob(format!("invalid job id {job_id:?}")))?;

                Ok(JobData {
                    job_id,
                    attempts_made,
                    claim_id,
                })
            })
            .collect()
    }
}

fn parse_field<T>(fields: &AHashMap<String, String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
{
    fields
        .get(name)
        .map(|value| {
            value
                .parse()
                .map_err(|_| Error::MalformedJob(format!("invalid value for field {name:?}")))
        })
        .transpose()
}

fn parse_snapshot(job_id: Uuid, fields: &AHashMap<String, String>) -> Result<JobSnapshot> {
    let state = fields
        .get("state")
        .ok_or_else(|| Error::MalformedJob("missing state".into()))?
        .parse::<JobState>()?;
    let output = fields
        .get("output")
        .map(|output| serde_json::from_str(output))
        .transpose()?;

    Ok(JobSnapshot {
        job_id,
        state,
        attempts_made: parse_field(fields, "attempts_made")?.unwrap_or_default(),
        progress: parse_field(fields, "progress")?.unwrap_or_default(),
        output,
        failed_reason: fields.get("failed_reason").cloned(),
        created_at: from_millis(parse_field(fields, "created_at")?.unwrap_or_default()),
        processed_at: parse_field(fields, "processed_at")?.map(from_millis),
        finished_at: parse_field(fields, "finished_at")?.map(from_millis),
    })
}

#[async_trait]
impl<CR> JobQueue for RedisJobQueue<CR>
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

        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(self.job_key(job_id)).await?;
        if exists {
            return Err(Error::DuplicateJob(job_id));
        }

        self.context_repository
            .store_context(job_id, context)
            .await
            .map_err(|err| Error::ContextRepository(err.into()))?;

        let inserted: bool = ENQUEUE
            .key(self.job_key(job_id))
            .key(self.key("wait"))
            .key(self.key("delayed"))
            .arg(job_id.to_string())
            .arg(to_millis(self.clock.now()))
            .arg(run_at.map_or(0, to_millis))
            .invoke_async(&mut conn)
            .await?;

        if !inserted {
            return Err(Error::DuplicateJob(job_id));
        }

        debug!(queue = %self.queue_name, %job_id, "enqueued job");
        Ok(())
    }

    async fn fetch_job_data(&self, max_jobs: usize) -> Result<Vec<JobData>> {
        let claimed = self.try_claim(max_jobs).await?;
        if !claimed.is_empty() || max_jobs == 0 {
            return Ok(claimed);
        }

        tokio::time::sleep(self.poll_interval).await;
        self.try_claim(max_jobs).await
    }

    async fn reclaim_job(&self, job_data: &JobData) -> Result<()> {
        let mut conn = self.conn.clone();
        let expires_at = self.clock.now() + self.lease_duration;

        let renewed: bool = RECLAIM
            .key(self.job_key(job_data.job_id))
            .key(self.key("active"))
            .arg(job_data.job_id.to_string())
            .arg(job_data.claim_id)
            .arg(to_millis(expires_at))
            .invoke_async(&mut conn)
            .await?;

        if !renewed {
            debug!(job_id = %job_data.job_id, "claim lost, lease not renewed");
        }

        Ok(())
    }

    async fn update_progress(&self, job_data: &JobData, progress: u8) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: bool = PROGRESS
            .key(self.job_key(job_data.job_id))
            .arg(job_data.claim_id)
            .arg(u32::from(progress.min(100)))
            .invoke_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn complete_job(&self, state: &JobResult<'_>) -> Result<Completion> {
        let job_id = state.job_data.job_id;
        let (outcome, payload) = match &state.outcome {
            Outcome::Success { output } => ("success", serde_json::to_string(output)?),
            Outcome::Fail { error } => ("fail", error.clone()),
        };
        let retry_delay = self.backoff.delay(state.job_data.attempts_made + 1);

        let mut conn = self.conn.clone();
        let (completion, attempts, run_at): (String, u32, u64) = COMPLETE
            .key(self.job_key(job_id))
            .key(self.key("wait"))
            .key(self.key("active"))
            .key(self.key("delayed"))
            .key(self.key("completed"))
            .key(self.key("failed"))
            .arg(job_id.to_string())
            .arg(state.job_data.claim_id)
            .arg(to_millis(self.clock.now()))
            .arg(outcome)
            .arg(payload)
            .arg(self.max_attempts)
            .arg(duration_millis(retry_delay))
            .arg(self.retention.keep_completed)
            .arg(self.retention.keep_failed)
            .arg(self.job_prefix())
            .invoke_async(&mut conn)
            .await?;

        let completion = match completion.as_str() {
            "completed" => Completion::Completed { attempts },
            "retrying" => Completion::Retrying {
                attempts,
                run_at: from_millis(run_at),
            },
            "exhausted" => Completion::Exhausted { attempts },
            "discarded" => Completion::Discarded,
            other => {
                return Err(Error::MalformedJob(format!(
                    "unknown completion {other:?}"
                )))
            }
        };

        if matches!(
            completion,
            Completion::Completed { .. } | Completion::Exhausted { .. }
        ) {
            self.context_repository
                .remove_context(job_id)
                .await
                .map_err(|err| Error::ContextRepository(err.into()))?;
        }

        Ok(completion)
    }

    async fn job_state(&self, job_id: Uuid) -> Result<Option<JobSnapshot>> {
        let mut conn = self.conn.clone();
        let fields: AHashMap<String, String> = conn.hgetall(self.job_key(job_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        parse_snapshot(job_id, &fields).map(Some)
    }
}

impl<CR> Clone for RedisJobQueue<CR> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            context_repository: Arc::clone(&self.context_repository),
            queue_name: self.queue_name.clone(),
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            retention: self.retention,
            lease_duration: self.lease_duration,
            poll_interval: self.poll_interval,
            clock: self.clock.clone(),
        }
    }
}
