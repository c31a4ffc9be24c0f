use crate::GenerationJob;
use ergane::{InMemoryContextRepository, JobContextRepository};
use futures_util::{stream::BoxStream, StreamExt, TryStreamExt};
use uuid::Uuid;

/// Context repository shared by the generation queues
pub enum QuillContextRepo {
    InMemory(InMemoryContextRepository<GenerationJob>),
    #[cfg(feature = "redis")]
    Redis(RedisContextRepository),
}

impl QuillContextRepo {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::InMemory(InMemoryContextRepository::new())
    }
}

impl JobContextRepository for QuillContextRepo {
    type JobContext = GenerationJob;
    type Error = eyre::Report;
    type Stream = BoxStream<'static, Result<(Uuid, Self::JobContext), Self::Error>>;

    async fn fetch_context<I>(&self, job_ids: I) -> Result<Self::Stream, Self::Error>
    where
        I: Iterator<Item = Uuid> + Send + 'static,
    {
        match self {
            Self::InMemory(repo) => {
                let stream = repo.fetch_context(job_ids).await?;
                Ok(stream.map_err(eyre::Report::from).boxed())
            }
            #[cfg(feature = "redis")]
            Self::Redis(repo) => repo.fetch_context(job_ids).await,
        }
    }

    async fn remove_context(&self, job_id: Uuid) -> Result<(), Self::Error> {
        match self {
            Self::InMemory(repo) => repo.remove_context(job_id).await?,
            #[cfg(feature = "redis")]
            Self::Redis(repo) => repo.remove_context(job_id).await?,
        }

        Ok(())
    }

    async fn store_context(
        &self,
        job_id: Uuid,
        context: Self::JobContext,
    ) -> Result<(), Self::Error> {
        match self {
            Self::InMemory(repo) => repo.store_context(job_id, context).await?,
            #[cfg(feature = "redis")]
            Self::Redis(repo) => repo.store_context(job_id, context).await?,
        }

        Ok(())
    }
}

#[cfg(feature = "redis")]
pub use self::redis_repo::RedisContextRepository;

#[cfg(feature = "redis")]
mod redis_repo {
    use crate::GenerationJob;
    use ergane::JobContextRepository;
    use futures_util::{
        stream::{self, BoxStream},
        StreamExt,
    };
    use redis::{aio::ConnectionManager, AsyncCommands};
    use smol_str::SmolStr;
    use uuid::Uuid;

    /// Stores the job contexts as JSON strings
    #[derive(Clone)]
    pub struct RedisContextRepository {
        conn: ConnectionManager,
        key_prefix: SmolStr,
    }

    impl RedisContextRepository {
        #[must_use]
        pub fn new(conn: ConnectionManager) -> Self {
            Self {
                conn,
                key_prefix: "quill:job-context:".into(),
            }
        }

        fn key(&self, job_id: Uuid) -> String {
            format!("{}{job_id}", self.key_prefix)
        }
    }

    impl JobContextRepository for RedisContextRepository {
        type JobContext = GenerationJob;
        type Error = eyre::Report;
        type Stream = BoxStream<'static, Result<(Uuid, Self::JobContext), Self::Error>>;

        async fn fetch_context<I>(&self, job_ids: I) -> Result<Self::Stream, Self::Error>
        where
            I: Iterator<Item = Uuid> + Send + 'static,
        {
            let job_ids: Vec<Uuid> = job_ids.collect();
            if job_ids.is_empty() {
                return Ok(stream::empty().boxed());
            }

            let keys: Vec<String> = job_ids.iter().map(|job_id| self.key(*job_id)).collect();
            let mut conn = self.conn.clone();
            let contexts: Vec<Option<String>> = redis::cmd("MGET")
                .arg(&keys)
                .query_async(&mut conn)
                .await?;

            let found: Vec<_> = job_ids
                .into_iter()
                .zip(contexts)
                .filter_map(|(job_id, context)| {
                    let context = context?;
                    Some(
                        serde_json::from_str(&context)
                            .map(|context| (job_id, context))
                            .map_err(eyre::Report::from),
                    )
                })
                .collect();

            Ok(stream::iter(found).boxed())
        }

        async fn remove_context(&self, job_id: Uuid) -> Result<(), Self::Error> {
            let mut conn = self.conn.clone();
            conn.del::<_, ()>(self.key(job_id)).await?;
            Ok(())
        }

        async fn store_context(
            &self,
            job_id: Uuid,
            context: Self::JobContext,
        ) -> Result<(), Self::Error> {
            let mut conn = self.conn.clone();
            conn.set::<_, _, ()>(self.key(job_id), serde_json::to_string(&context)?)
                .await?;
            Ok(())
        }
    }
}
