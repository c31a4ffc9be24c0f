use crate::{GenerationOutput, GenerationRequest, Generator, Result};
use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_CAPACITY: u64 = 10_000;

/// Caches successful outputs by idempotency key
///
/// A job that is executed twice within the TTL calls the provider only once.
/// The cache is process-local, duplicates across processes still reach the provider.
pub struct Deduplicating<G> {
    inner: G,
    cache: Cache<Uuid, GenerationOutput>,
}

impl<G> Deduplicating<G> {
    #[must_use]
    pub fn new(inner: G, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(DEFAULT_CAPACITY)
            .build();

        Self { inner, cache }
    }
}

#[async_trait]
impl<G> Generator for Deduplicating<G>
where
    G: Generator,
{
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        if let Some(output) = self.cache.get(&request.idempotency_key).await {
            debug!(job_id = %request.idempotency_key, "serving generation output from cache");
            return Ok(output);
        }

        let output = self.inner.generate(request).await?;
        self.cache
            .insert(request.idempotency_key, output.clone())
            .await;

        Ok(output)
    }
}

#[cfg(test)]
mod test {
    use super::Deduplicating;
    use crate::{Error, GenerationOutput, GenerationRequest, Generator, Modality, Result};
    use async_trait::async_trait;
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };
    use uuid::Uuid;

    #[derive(Default)]
    struct Counting {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Generator for Counting {
        fn provider(&self) -> &str {
            "counting"
        }

        fn model_name(&self) -> &str {
            "counting-1"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
            let call = self.calls.fetch_add(1, Ordering::AcqRel);
            if request.prompt == "fail" {
                return Err(Error::Transient("overloaded".into()));
            }

            Ok(GenerationOutput::Text(format!("call {call}")))
        }
    }

    fn request(key: Uuid, prompt: &str) -> GenerationRequest {
        GenerationRequest::builder()
            .idempotency_key(key)
            .modality(Modality::Text)
            .prompt(prompt)
            .build()
    }

    #[tokio::test]
    async fn same_key_hits_provider_once() {
        let generator = Deduplicating::new(Counting::default(), Duration::from_secs(60));
        let key = Uuid::now_v7();

        let first = generator.generate(&request(key, "topic")).await.unwrap();
        let second = generator.generate(&request(key, "topic")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(generator.inner.calls.load(Ordering::Acquire), 1);
        assert_eq!(generator.provider(), "counting");
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let generator = Deduplicating::new(Counting::default(), Duration::from_secs(60));
        let key = Uuid::now_v7();

        assert!(generator.generate(&request(key, "fail")).await.is_err());
        assert!(generator.generate(&request(key, "fail")).await.is_err());
        assert_eq!(generator.inner.calls.load(Ordering::Acquire), 2);
    }
}
