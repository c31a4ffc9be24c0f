#[macro_use]
extern crate tracing;

use self::payload::{BlogOutline, ImageGenerate, SeoMetadata, SocialCaption};
use ergane::{RunInfo, Runnable};
use quill_db::JobRecordStore;
use quill_generation::{
    AssetSink, GenerationOutput, GenerationRequest, Generator, Modality,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use typed_builder::TypedBuilder;
use uuid::Uuid;

pub use self::{
    kind::{JobKind, KindDescriptor, PayloadError, QueueKind},
    repo::QuillContextRepo,
};

pub mod kind;
pub mod payload;
mod repo;

#[cfg(feature = "redis")]
pub use self::repo::RedisContextRepository;

#[derive(Clone, TypedBuilder)]
pub struct JobRunnerContext {
    pub asset_sink: Arc<dyn AssetSink>,
    pub generator: Arc<dyn Generator>,
    pub record_store: Arc<dyn JobRecordStore>,
}

/// Generation job as stored inside the context repository
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum GenerationJob {
    TextBlogOutline(BlogOutline),
    TextSocialCaption(SocialCaption),
    TextSeoMetadata(SeoMetadata),
    ImageGenerate(ImageGenerate),
}

impl From<BlogOutline> for GenerationJob {
    fn from(value: BlogOutline) -> Self {
        Self::TextBlogOutline(value)
    }
}

impl From<SocialCaption> for GenerationJob {
    fn from(value: SocialCaption) -> Self {
        Self::TextSocialCaption(value)
    }
}

impl From<SeoMetadata> for GenerationJob {
    fn from(value: SeoMetadata) -> Self {
        Self::TextSeoMetadata(value)
    }
}

impl From<ImageGenerate> for GenerationJob {
    fn from(value: ImageGenerate) -> Self {
        Self::ImageGenerate(value)
    }
}

impl GenerationJob {
    #[must_use]
    pub fn kind(&self) -> JobKind {
        match self {
            Self::TextBlogOutline(..) => JobKind::TextBlogOutline,
            Self::TextSocialCaption(..) => JobKind::TextSocialCaption,
            Self::TextSeoMetadata(..) => JobKind::TextSeoMetadata,
            Self::ImageGenerate(..) => JobKind::ImageGenerate,
        }
    }

    fn request(&self, run: &RunInfo) -> GenerationRequest {
        let (modality, prompt) = match self {
            Self::TextBlogOutline(outline) => (Modality::Text, outline.prompt()),
            Self::TextSocialCaption(caption) => (Modality::Text, caption.prompt()),
            Self::TextSeoMetadata(metadata) => (Modality::Text, metadata.prompt()),
            Self::ImageGenerate(image) => (image.modality(), image.prompt()),
        };

        GenerationRequest::builder()
            .idempotency_key(run.job_id)
            .modality(modality)
            .prompt(prompt)
            .attempt(run.attempt)
            .build()
    }

    async fn shape_result(
        &self,
        ctx: &JobRunnerContext,
        job_id: Uuid,
        output: GenerationOutput,
    ) -> eyre::Result<serde_json::Value> {
        let result = match (self, output) {
            (Self::TextSeoMetadata(metadata), GenerationOutput::Text(text)) => json!({
                "metaTitle": metadata.meta_title(),
                "metaDescription": SeoMetadata::meta_description(&text),
                "text": text,
            }),
            (
                Self::TextBlogOutline(..) | Self::TextSocialCaption(..),
                GenerationOutput::Text(text),
            ) => json!({ "text": text }),
            (
                Self::ImageGenerate(image),
                GenerationOutput::Image {
                    bytes,
                    content_type,
                },
            ) => {
                let key = format!("images/{job_id}.png");
                let url = ctx.asset_sink.put(&key, &content_type, bytes).await?;

                json!({
                    "url": url,
                    "contentType": content_type.as_str(),
                    "size": image.size.as_ref(),
                })
            }
            (job, _) => eyre::bail!("provider returned the wrong modality for {}", job.kind()),
        };

        Ok(result)
    }

    async fn execute(
        &self,
        ctx: &JobRunnerContext,
        run: &RunInfo,
    ) -> eyre::Result<serde_json::Value> {
        ctx.record_store
            .mark_processing(run.job_id, run.attempt)
            .await?;
        run.report_progress(10);

        let output = ctx.generator.generate(&self.request(run)).await?;
        run.report_progress(80);

        let result = self.shape_result(ctx, run.job_id, output).await?;
        ctx.record_store
            .mark_completed(run.job_id, result.clone(), run.attempt)
            .await?;

        Ok(result)
    }
}

impl Runnable for GenerationJob {
    type Context = JobRunnerContext;
    type Output = serde_json::Value;
    type Error = eyre::Report;

    #[instrument(skip_all, fields(job_id = %run.job_id, kind = %self.kind(), attempt = run.attempt))]
    async fn run(&self, ctx: &Self::Context, run: &RunInfo) -> Result<Self::Output, Self::Error> {
        let result = self.execute(ctx, run).await;

        if let Err(ref error) = result {
            if !run.is_last_attempt() {
                debug!(%error, "attempt failed, job goes back to the queue");

                // Back to queued while the backoff runs
                if let Err(error) = ctx.record_store.mark_queued(run.job_id, run.attempt).await {
                    error!(?error, "failed to update job record");
                }
            }
        }

        result
    }

    #[instrument(skip_all, fields(job_id = %run.job_id, kind = %self.kind()))]
    async fn on_exhausted(&self, ctx: &Self::Context, run: &RunInfo, error: &str) {
        if let Err(error) = ctx
            .record_store
            .mark_failed(run.job_id, error.to_string(), run.attempt)
            .await
        {
            error!(?error, "failed to mark job record as failed");
        }
    }
}
