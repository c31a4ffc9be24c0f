use async_trait::async_trait;
use ergane::{
    Completion, JobContextRepository, JobData, JobDetails, JobQueue, JobResult, JobSnapshot,
};
use pretty_assertions::assert_eq;
use quill_config::job_queue::{Backend, Configuration, QueueConfiguration};
use quill_db::{InMemoryRecordStore, JobRecordStore, NewJobRecord};
use quill_error::ErrorType;
use quill_job_runner::{prepare_job_queues, JobQueues};
use quill_jobs::{PayloadError, QuillContextRepo};
use quill_service::{Error, JobService, Submission};
use quill_type::job::JobStatus;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tick_tock_mock::{Clock, DeltaDirection, MockHandle};
use uuid::Uuid;

fn queue_config() -> Configuration {
    Configuration {
        backend: Backend::InMemory,
        text: QueueConfiguration::text(),
        image: QueueConfiguration::image(),
        lease_secs: 30,
        stuck_after_secs: 600,
    }
}

struct Harness {
    service: JobService,
    queues: JobQueues,
    records: Arc<InMemoryRecordStore>,
    mock: MockHandle,
}

async fn harness() -> Harness {
    let (clock, mock) = Clock::mockable();
    let queues = prepare_job_queues(&queue_config(), clock.clone())
        .await
        .unwrap();

    with_queues(queues, clock, mock)
}

fn with_queues(queues: JobQueues, clock: Clock, mock: MockHandle) -> Harness {
    let records = Arc::new(InMemoryRecordStore::with_clock(clock.clone()));
    let service = JobService::builder()
        .queues(queues.clone())
        .record_store(records.clone())
        .provider("template")
        .model_name("template-v1")
        .stuck_after(Duration::from_secs(600))
        .clock(clock)
        .build();

    Harness {
        service,
        queues,
        records,
        mock,
    }
}

fn blog_outline() -> Submission {
    Submission::builder()
        .tenant_id("acme")
        .user_id("editor")
        .job_type("text-blog-outline")
        .payload(json!({ "brandVoice": "friendly", "topic": "Spring launch" }))
        .build()
}

#[tokio::test]
async fn submission_creates_queued_record() {
    let harness = harness().await;

    let response = harness.service.submit(blog_outline()).await.unwrap();
    assert_eq!(response.status, JobStatus::Queued);

    let record = harness.records.get(response.job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Queued);
    assert_eq!(record.tenant_id, "acme");
    assert_eq!(record.job_type, "text-blog-outline");
    assert_eq!(record.provider, "template");
    assert_eq!(record.attempts, 0);

    let status = harness.service.status(response.job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Queued);
    assert_eq!(status.job_id, response.job_id);
    assert_eq!(status.attempts, 0);
    assert_eq!(status.result, None);
    assert_eq!(status.error, None);
}

#[tokio::test]
async fn invalid_payload_creates_nothing() {
    let harness = harness().await;

    let submission = Submission::builder()
        .tenant_id("acme")
        .user_id("editor")
        .job_type("text-blog-outline")
        .payload(json!({ "brandVoice": "friendly" }))
        .build();
    let error = harness.service.submit(submission).await.unwrap_err();

    assert!(matches!(error, Error::Payload(PayloadError::Malformed(..))));
    assert!(matches!(error.error_type(), ErrorType::BadRequest(Some(..))));
    assert!(harness
        .records
        .list_for_tenant("acme", 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unknown_kind_is_rejected() {
    let harness = harness().await;

    let submission = Submission::builder()
        .tenant_id("acme")
        .user_id("editor")
        .job_type("video-generate")
        .payload(json!({}))
        .build();
    let error = harness.service.submit(submission).await.unwrap_err();

    assert!(matches!(error, Error::Payload(PayloadError::UnknownKind(..))));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let harness = harness().await;

    let error = harness.service.status(Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(error, Error::NotFound(..)));
    assert_eq!(error.error_type(), ErrorType::NotFound);
}

#[tokio::test]
async fn live_progress_wins_over_record() {
    let harness = harness().await;
    let response = harness.service.submit(blog_outline()).await.unwrap();

    let claims = harness.queues.text.fetch_job_data(1).await.unwrap();
    assert_eq!(claims.len(), 1);
    harness
        .queues
        .text
        .update_progress(&claims[0], 50)
        .await
        .unwrap();

    let status = harness.service.status(response.job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Processing);
    assert_eq!(status.progress, Some(50));
}

#[tokio::test]
async fn idle_queued_job_is_reported_stuck() {
    let harness = harness().await;
    let response = harness.service.submit(blog_outline()).await.unwrap();

    harness
        .mock
        .adjust(DeltaDirection::Add, Duration::from_secs(601));

    let status = harness.service.status(response.job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Stuck);
    assert!(status.error.is_some());
}

#[tokio::test]
async fn record_answers_after_queue_forgot_the_job() {
    let harness = harness().await;
    let job_id = Uuid::now_v7();

    harness
        .records
        .insert(
            NewJobRecord::builder()
                .job_id(job_id)
                .tenant_id("acme")
                .user_id("editor")
                .job_type("text-social-caption")
                .provider("template")
                .model_name("template-v1")
                .build(),
        )
        .await
        .unwrap();
    harness
        .records
        .mark_completed(job_id, json!({ "text": "Spring is here" }), 2)
        .await
        .unwrap();

    let first = harness.service.status(job_id).await.unwrap();
    let second = harness.service.status(job_id).await.unwrap();

    assert_eq!(first.status, JobStatus::Completed);
    assert_eq!(first.result, Some(json!({ "text": "Spring is here" })));
    assert_eq!(first.attempts, 2);
    assert!(first.completed_at.is_some());
    assert_eq!(first, second);
}

/// Accepts nothing, every call fails
struct Unreachable {
    repo: QuillContextRepo,
}

fn unreachable() -> ergane::Error {
    ergane::Error::ContextRepository("backend unreachable".into())
}

#[async_trait]
impl JobQueue for Unreachable {
    type ContextRepository = QuillContextRepo;

    fn context_repository(&self) -> &Self::ContextRepository {
        &self.repo
    }

    fn queue_name(&self) -> &str {
        "unreachable"
    }

    fn max_attempts(&self) -> u32 {
        3
    }

    fn lease_duration(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn enqueue(
        &self,
        _job_details: JobDetails<<Self::ContextRepository as JobContextRepository>::JobContext>,
    ) -> ergane::Result<()> {
        Err(unreachable())
    }

    async fn fetch_job_data(&self, _max_jobs: usize) -> ergane::Result<Vec<JobData>> {
        Err(unreachable())
    }

    async fn reclaim_job(&self, _job_data: &JobData) -> ergane::Result<()> {
        Err(unreachable())
    }

    async fn update_progress(&self, _job_data: &JobData, _progress: u8) -> ergane::Result<()> {
        Err(unreachable())
    }

    async fn complete_job(&self, _state: &JobResult<'_>) -> ergane::Result<Completion> {
        Err(unreachable())
    }

    async fn job_state(&self, _job_id: Uuid) -> ergane::Result<Option<JobSnapshot>> {
        Err(unreachable())
    }
}

fn unreachable_queues() -> JobQueues {
    let queue: quill_job_runner::AnyQueue = Arc::new(Unreachable {
        repo: QuillContextRepo::in_memory(),
    });

    JobQueues {
        text: queue.clone(),
        image: queue,
    }
}

#[tokio::test]
async fn failed_enqueue_marks_record_failed() {
    let (clock, mock) = Clock::mockable();
    let harness = with_queues(unreachable_queues(), clock, mock);

    let error = harness.service.submit(blog_outline()).await.unwrap_err();
    assert!(matches!(error, Error::Queue(..)));

    let records = harness.records.list_for_tenant("acme", 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, JobStatus::Failed);
    assert_eq!(
        records[0].error_message.as_deref(),
        Some("failed to enqueue job: backend unreachable")
    );
}


#[tokio::test]
async fn record_answers_when_queue_is_unreachable() {
    let (clock, mock) = Clock::mockable();
    let harness = with_queues(unreachable_queues(), clock, mock);

    let job_id = Uuid::now_v7();
    harness
        .records
        .insert(
            NewJobRecord::builder()
                .job_id(job_id)
                .tenant_id("acme")
                .user_id("editor")
                .job_type("text-blog-outline")
                .provider("template")
                .model_name("template-v1")
                .build(),
        )
        .await
        .unwrap();
    harness
        .records
        .mark_completed(job_id, json!({ "outline": ["intro"] }), 1)
        .await
        .unwrap();

    let status = harness.service.status(job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.result, Some(json!({ "outline": ["intro"] })));
    assert_eq!(status.attempts, 1);

    let error = harness.service.status(Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(error, Error::NotFound(..)));
}
