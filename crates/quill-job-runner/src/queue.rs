use ergane::{Backoff, InMemoryJobQueue, JobQueue, Retention};
use quill_config::job_queue::{Backend, Configuration, QueueConfiguration};
use quill_jobs::{QueueKind, QuillContextRepo};
use std::sync::Arc;
use tick_tock_mock::Clock;

pub type AnyQueue = Arc<dyn JobQueue<ContextRepository = QuillContextRepo>>;

/// The text and image generation queues
#[derive(Clone)]
pub struct JobQueues {
    pub text: AnyQueue,
    pub image: AnyQueue,
}

impl JobQueues {
    #[must_use]
    pub fn get(&self, kind: QueueKind) -> &AnyQueue {
        match kind {
            QueueKind::TextGeneration => &self.text,
            QueueKind::ImageGeneration => &self.image,
        }
    }
}

fn retention(config: &QueueConfiguration) -> Retention {
    Retention {
        keep_completed: config.keep_completed,
        keep_failed: config.keep_failed,
    }
}

fn in_memory_queue(
    kind: QueueKind,
    config: &Configuration,
    queue_config: &QueueConfiguration,
    context_repository: &Arc<QuillContextRepo>,
    clock: &Clock,
) -> AnyQueue {
    let queue = InMemoryJobQueue::builder()
        .context_repository(Arc::clone(context_repository))
        .queue_name(kind.as_ref())
        .max_attempts(queue_config.max_attempts)
        .backoff(Backoff::exponential(queue_config.backoff_base()))
        .retention(retention(queue_config))
        .lease_duration(config.lease())
        .clock(clock.clone())
        .build();

    Arc::new(queue)
}

#[cfg(feature = "redis")]
fn redis_queue(
    kind: QueueKind,
    config: &Configuration,
    queue_config: &QueueConfiguration,
    conn: &redis::aio::ConnectionManager,
    context_repository: &Arc<QuillContextRepo>,
    clock: &Clock,
) -> AnyQueue {
    let queue = ergane::RedisJobQueue::builder()
        .conn(conn.clone())
        .context_repository(Arc::clone(context_repository))
        .queue_name(kind.as_ref())
        .max_attempts(queue_config.max_attempts)
        .backoff(Backoff::exponential(queue_config.backoff_base()))
        .retention(retention(queue_config))
        .lease_duration(config.lease())
        .clock(clock.clone())
        .build();

    Arc::new(queue)
}

/// Build both queues on the configured backend
///
/// The queues share a single context repository
#[instrument(skip_all)]
pub async fn prepare_job_queues(config: &Configuration, clock: Clock) -> eyre::Result<JobQueues> {
    let queues = match config.backend {
        Backend::InMemory => {
            warn!("using the in-memory queue backend, jobs won't survive a restart");

            let context_repository = Arc::new(QuillContextRepo::in_memory());
            JobQueues {
                text: in_memory_queue(
                    QueueKind::TextGeneration,
                    config,
                    &config.text,
                    &context_repository,
                    &clock,
                ),
                image: in_memory_queue(
                    QueueKind::ImageGeneration,
                    config,
                    &config.image,
                    &context_repository,
                    &clock,
                ),
            }
        }
        #[cfg(feature = "redis")]
        Backend::Redis(ref redis_config) => {
            let client = redis::Client::open(redis_config.redis_url.as_str())?;
            let conn = redis::aio::ConnectionManager::new(client).await?;

            let context_repository = Arc::new(QuillContextRepo::Redis(
                quill_jobs::RedisContextRepository::new(conn.clone()),
            ));
            JobQueues {
                text: redis_queue(
                    QueueKind::TextGeneration,
                    config,
                    &config.text,
                    &conn,
                    &context_repository,
                    &clock,
                ),
                image: redis_queue(
                    QueueKind::ImageGeneration,
                    config,
                    &config.image,
                    &conn,
                    &context_repository,
                    &clock,
                ),
            }
        }
        #[cfg(not(feature = "redis"))]
        Backend::Redis(..) => {
            eyre::bail!("the redis queue backend requires building with the \"redis\" feature");
        }
    };

    Ok(queues)
}
