#![cfg(feature = "redis")]

use ergane::{
    Backoff, Completion, InMemoryContextRepository, JobData, JobDetails, JobQueue, JobResult,
    JobState, Outcome, RedisJobQueue, Retention, RunInfo, Runnable,
};
use pretty_assertions::assert_eq;
use redis::aio::ConnectionManager;
use std::{future::Future, sync::Arc, time::Duration};
use tick_tock_mock::{Clock, DeltaDirection, MockHandle};
use tokio::task::JoinSet;
use uuid::Uuid;

#[derive(Clone)]
enum TestJob {
    Double(u32),
    Fail,
}

impl Runnable for TestJob {
    type Context = ();
    type Output = u32;
    type Error = &'static str;

    async fn run(&self, _ctx: &Self::Context, run: &RunInfo) -> Result<Self::Output, Self::Error> {
        run.report_progress(50);

        match self {
            Self::Double(value) => Ok(value * 2),
            Self::Fail => Err("boom"),
        }
    }

    async fn on_exhausted(&self, _ctx: &Self::Context, _run: &RunInfo, _error: &str) {}
}

type Repo = InMemoryContextRepository<TestJob>;

struct Fixture {
    queue: RedisJobQueue<Repo>,
    repo: Arc<Repo>,
    clock: Clock,
    mock: MockHandle,
}

/// Runs the test against the server in `REDIS_URL`, skips it when the variable isn't set
async fn redis_test<F, Fut>(configure: impl FnOnce(&mut Setup), test: F)
where
    F: FnOnce(Fixture) -> Fut,
    Fut: Future<Output = ()>,
{
    let Ok(url) = std::env::var("REDIS_URL") else {
        eprintln!("REDIS_URL not set, skipping redis test");
        return;
    };

    let client = redis::Client::open(url).unwrap();
    let conn = ConnectionManager::new(client).await.unwrap();

    let mut setup = Setup::default();
    configure(&mut setup);

    let repo = Arc::new(Repo::new());
    let (clock, mock) = Clock::mockable();
    let queue = RedisJobQueue::builder()
        .conn(conn)
        .context_repository(Arc::clone(&repo))
        // Fresh keyspace per test
        .queue_name(format!("ergane-test:{}", Uuid::now_v7()))
        .max_attempts(setup.max_attempts)
        .backoff(Backoff::exponential(Duration::from_secs(2)))
        .retention(setup.retention)
        .poll_interval(Duration::from_millis(10))
        .clock(clock.clone())
        .build();

    test(Fixture {
        queue,
        repo,
        clock,
        mock,
    })
    .await;
}

struct Setup {
    max_attempts: u32,
    retention: Retention,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retention: Retention::default(),
        }
    }
}

async fn enqueue(queue: &RedisJobQueue<Repo>, job: TestJob) -> Uuid {
    let job_id = Uuid::now_v7();
    queue
        .enqueue(JobDetails::builder().context(job).job_id(job_id).build())
        .await
        .unwrap();

    job_id
}

fn succeed(job_data: &JobData) -> JobResult<'_> {
    JobResult {
        job_data,
        outcome: Outcome::Success {
            output: serde_json::json!(2),
        },
    }
}

fn fail(job_data: &JobData) -> JobResult<'_> {
    JobResult {
        job_data,
        outcome: Outcome::Fail {
            error: "boom".into(),
        },
    }
}

fn ids(claims: &[JobData]) -> Vec<Uuid> {
    claims.iter().map(|data| data.job_id).collect()
}

#[tokio::test]
async fn claims_in_fifo_order() {
    redis_test(|_| {}, |Fixture { queue, .. }| async move {
        let first = enqueue(&queue, TestJob::Double(1)).await;
        let second = enqueue(&queue, TestJob::Double(2)).await;
        let third = enqueue(&queue, TestJob::Double(3)).await;

        let claimed = queue.fetch_job_data(2).await.unwrap();
        assert_eq!(ids(&claimed), [first, second]);

        let rest = queue.fetch_job_data(2).await.unwrap();
        assert_eq!(ids(&rest), [third]);

        let snapshot = queue.job_state(third).await.unwrap().unwrap();
        assert_eq!(snapshot.state, JobState::Active);
        assert!(queue.fetch_job_data(1).await.unwrap().is_empty());
    })
    .await;
}

#[tokio::test]
async fn rejects_duplicate_job_ids() {
    redis_test(|_| {}, |Fixture { queue, .. }| async move {
        let job_id = enqueue(&queue, TestJob::Double(1)).await;

        let result = queue
            .enqueue(
                JobDetails::builder()
                    .context(TestJob::Double(1))
                    .job_id(job_id)
                    .build(),
            )
            .await;

        assert!(matches!(result, Err(ergane::Error::DuplicateJob(id)) if id == job_id));
    })
    .await;
}

#[tokio::test]
async fn stale_claim_is_discarded() {
    redis_test(|_| {}, |Fixture { queue, mock, .. }| async move {
        let job_id = enqueue(&queue, TestJob::Double(1)).await;
        let old_claim = queue.fetch_job_data(1).await.unwrap().remove(0);

        mock.adjust(DeltaDirection::Add, Duration::from_secs(31));

        let new_claim = queue.fetch_job_data(1).await.unwrap().remove(0);
        assert_eq!(new_claim.job_id, job_id);
        assert_eq!(new_claim.attempts_made, 0);
        assert_ne!(new_claim.claim_id, old_claim.claim_id);

        // Renewing a lost claim is a no-op
        queue.reclaim_job(&old_claim).await.unwrap();

        assert_eq!(
            queue.complete_job(&succeed(&old_claim)).await.unwrap(),
            Completion::Discarded
        );
        assert_eq!(
            queue.complete_job(&succeed(&new_claim)).await.unwrap(),
            Completion::Completed { attempts: 1 }
        );
    })
    .await;
}

#[tokio::test]
async fn stalled_jobs_requeue_in_creation_order() {
    redis_test(|_| {}, |Fixture { queue, mock, .. }| async move {
        let older = enqueue(&queue, TestJob::Double(1)).await;
        mock.adjust(DeltaDirection::Add, Duration::from_secs(1));
        let newer = enqueue(&queue, TestJob::Double(2)).await;

        let claims = queue.fetch_job_data(2).await.unwrap();
        assert_eq!(ids(&claims), [older, newer]);

        // The older job's lease now runs out last
        mock.adjust(DeltaDirection::Add, Duration::from_secs(10));
        queue.reclaim_job(&claims[0]).await.unwrap();
        let waiting = enqueue(&queue, TestJob::Double(3)).await;
        mock.adjust(DeltaDirection::Add, Duration::from_secs(45));

        let requeued = queue.fetch_job_data(3).await.unwrap();
        assert_eq!(ids(&requeued), [older, newer, waiting]);
    })
    .await;
}

#[tokio::test]
async fn heartbeat_keeps_the_lease() {
    redis_test(|_| {}, |Fixture { queue, mock, .. }| async move {
        enqueue(&queue, TestJob::Double(1)).await;
        let claim = queue.fetch_job_data(1).await.unwrap().remove(0);

        mock.adjust(DeltaDirection::Add, Duration::from_secs(20));
        queue.reclaim_job(&claim).await.unwrap();
        mock.adjust(DeltaDirection::Add, Duration::from_secs(20));

        assert!(queue.fetch_job_data(1).await.unwrap().is_empty());
    })
    .await;
}

#[tokio::test]
async fn delayed_job_is_promoted_when_due() {
    redis_test(
        |_| {},
        |Fixture {
             queue, clock, mock, ..
         }| async move {
            let job_id = Uuid::now_v7();
            queue
                .enqueue(
                    JobDetails::builder()
                        .context(TestJob::Double(1))
                        .job_id(job_id)
                        .run_at(clock.now() + Duration::from_secs(5))
                        .build(),
                )
                .await
                .unwrap();

            assert!(queue.fetch_job_data(1).await.unwrap().is_empty());
            let snapshot = queue.job_state(job_id).await.unwrap().unwrap();
            assert_eq!(snapshot.state, JobState::Delayed);

            mock.adjust(DeltaDirection::Add, Duration::from_secs(6));
            let claimed = queue.fetch_job_data(1).await.unwrap();
            assert_eq!(ids(&claimed), [job_id]);
        },
    )
    .await;
}

#[tokio::test]
async fn failed_job_backs_off_then_exhausts() {
    redis_test(
        |setup| setup.max_attempts = 2,
        |Fixture { queue, repo, mock, .. }| async move {
            let job_id = enqueue(&queue, TestJob::Fail).await;

            let claim = queue.fetch_job_data(1).await.unwrap().remove(0);
            let Completion::Retrying { attempts, .. } =
                queue.complete_job(&fail(&claim)).await.unwrap()
            else {
                panic!("expected a retry");
            };
            assert_eq!(attempts, 1);

            let snapshot = queue.job_state(job_id).await.unwrap().unwrap();
            assert_eq!(snapshot.state, JobState::Delayed);
            assert_eq!(snapshot.failed_reason.as_deref(), Some("boom"));
            assert!(queue.fetch_job_data(1).await.unwrap().is_empty());

            mock.adjust(DeltaDirection::Add, Duration::from_secs(3));
            let claim = queue.fetch_job_data(1).await.unwrap().remove(0);
            assert_eq!(claim.attempts_made, 1);
            assert_eq!(
                queue.complete_job(&fail(&claim)).await.unwrap(),
                Completion::Exhausted { attempts: 2 }
            );

            let snapshot = queue.job_state(job_id).await.unwrap().unwrap();
            assert_eq!(snapshot.state, JobState::Failed);
            assert!(snapshot.finished_at.is_some());
            assert!(repo.is_empty());
        },
    )
    .await;
}

#[tokio::test]
async fn retention_prunes_oldest_completed_jobs() {
    redis_test(
        |setup| {
            setup.retention = Retention {
                keep_completed: 2,
                keep_failed: 2,
            };
        },
        |Fixture { queue, .. }| async move {
            let mut job_ids = Vec::new();
            for value in 0..3 {
                job_ids.push(enqueue(&queue, TestJob::Double(value)).await);
            }

            for claim in queue.fetch_job_data(3).await.unwrap() {
                queue.complete_job(&succeed(&claim)).await.unwrap();
            }

            assert!(queue.job_state(job_ids[0]).await.unwrap().is_none());
            assert!(queue.job_state(job_ids[1]).await.unwrap().is_some());
            assert!(queue.job_state(job_ids[2]).await.unwrap().is_some());
        },
    )
    .await;
}

#[tokio::test]
async fn progress_is_visible_while_active() {
    redis_test(|_| {}, |Fixture { queue, .. }| async move {
        let job_id = enqueue(&queue, TestJob::Double(1)).await;
        let claim = queue.fetch_job_data(1).await.unwrap().remove(0);

        queue.update_progress(&claim, 40).await.unwrap();

        let snapshot = queue.job_state(job_id).await.unwrap().unwrap();
        assert_eq!(snapshot.state, JobState::Active);
        assert_eq!(snapshot.progress, 40);
    })
    .await;
}

#[tokio::test]
async fn spawned_job_stores_its_output() {
    redis_test(|_| {}, |Fixture { queue, repo, .. }| async move {
        let job_id = enqueue(&queue, TestJob::Double(21)).await;

        let mut join_set = JoinSet::new();
        let spawned = ergane::spawn_jobs(&queue, 4, Arc::new(()), &mut join_set)
            .await
            .unwrap();
        assert_eq!(spawned, 1);
        while join_set.join_next().await.is_some() {}

        let snapshot = queue.job_state(job_id).await.unwrap().unwrap();
        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(snapshot.output, Some(serde_json::json!(42)));
        assert_eq!(snapshot.progress, 100);
        assert!(repo.is_empty());
    })
    .await;
}
