#[macro_use]
extern crate tracing;

use self::status::{reconcile, Observation};
use async_trait::async_trait;
use ergane::{JobDetails, JobQueue, JobSnapshot};
use quill_db::{JobRecordStore, NewJobRecord};
use quill_job_runner::JobQueues;
use quill_jobs::JobKind;
use quill_type::job::{JobStatus, StatusResponse, SubmitResponse};
use smol_str::SmolStr;
use std::{sync::Arc, time::Duration};
use tick_tock_mock::Clock;
use typed_builder::TypedBuilder;
use uuid::Uuid;

pub use self::error::{Error, Result};

mod error;
mod status;

const DEFAULT_STUCK_AFTER: Duration = Duration::from_secs(10 * 60);

#[derive(TypedBuilder)]
pub struct Submission {
    #[builder(setter(into))]
    pub tenant_id: SmolStr,
    #[builder(setter(into))]
    pub user_id: SmolStr,
    #[builder(setter(into))]
    pub job_type: String,
    pub payload: serde_json::Value,
}

#[derive(Clone, TypedBuilder)]
pub struct JobService {
    queues: JobQueues,
    record_store: Arc<dyn JobRecordStore>,
    #[builder(setter(into))]
    provider: SmolStr,
    #[builder(setter(into))]
    model_name: SmolStr,
    #[builder(default = DEFAULT_STUCK_AFTER)]
    stuck_after: Duration,
    #[builder(default)]
    clock: Clock,
}

impl JobService {
    /// Validate the payload, record the job and put it onto the queue of its kind
    #[instrument(skip_all, fields(tenant_id = %submission.tenant_id, job_type = %submission.job_type))]
    pub async fn submit(&self, submission: Submission) -> Result<SubmitResponse> {
        let kind = JobKind::parse(&submission.job_type)?;
        let job = kind.descriptor().parse(submission.payload)?;
        let job_id = Uuid::now_v7();

        self.record_store
            .insert(
                NewJobRecord::builder()
                    .job_id(job_id)
                    .tenant_id(submission.tenant_id)
                    .user_id(submission.user_id)
                    .job_type(kind.as_ref())
                    .provider(self.provider.clone())
                    .model_name(self.model_name.clone())
                    .build(),
            )
            .await?;

        let enqueue_result = self
            .queues
            .get(kind.queue())
            .enqueue(JobDetails::builder().context(job).job_id(job_id).build())
            .await;

        if let Err(error) = enqueue_result {
            error!(?error, %job_id, "failed to enqueue job");

            if let Err(error) = self
                .record_store
                .mark_failed(job_id, format!("failed to enqueue job: {error}"), 0)
                .await
            {
                error!(?error, %job_id, "failed to mark job record as failed");
            }

            return Err(error.into());
        }

        info!(%job_id, queue = %kind.queue(), "job queued");

        Ok(SubmitResponse {
            job_id,
            status: JobStatus::Queued,
        })
    }

    /// Unreachable queues count as not knowing the job, the record answers instead
    async fn live_state(&self, job_id: Uuid) -> Option<JobSnapshot> {
        for queue in [&self.queues.text, &self.queues.image] {
            match queue.job_state(job_id).await {
                Ok(Some(snapshot)) => return Some(snapshot),
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        ?error,
                        %job_id,
                        queue = queue.queue_name(),
                        "failed to read live job state"
                    );
                }
            }
        }

        None
    }

    /// Current status of the job, combining the queue and the job record
    #[instrument(skip(self))]
    pub async fn status(&self, job_id: Uuid) -> Result<StatusResponse> {
        let live = self.live_state(job_id).await.map(Observation::from);
        let stored = self
            .record_store
            .get(job_id)
            .await?
            .map(Observation::from);

        let observation = reconcile(live, stored).ok_or(Error::NotFound(job_id))?;
        let response = observation
            .flag_stuck(self.clock.now(), self.stuck_after)
            .into_response(job_id);

        Ok(response)
    }
}

#[async_trait]
impl quill_poller::StatusSource for JobService {
    async fn fetch_status(
        &self,
        job_id: Uuid,
    ) -> Result<Option<StatusResponse>, quill_poller::BoxError> {
        match self.status(job_id).await {
            Ok(status) => Ok(Some(status)),
            Err(Error::NotFound(..)) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}
