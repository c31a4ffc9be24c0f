#[macro_use]
extern crate tracing;

use async_trait::async_trait;
use bytes::Bytes;
use smol_str::SmolStr;
use std::sync::Arc;
use typed_builder::TypedBuilder;
use uuid::Uuid;

pub use self::{
    asset::{AssetSink, InMemoryAssetSink},
    dedup::Deduplicating,
    error::{Error, Result},
    template::TemplateGenerator,
};

mod asset;
mod dedup;
mod error;
mod template;

#[derive(Clone, Debug, PartialEq)]
pub enum Modality {
    Text,
    Image { size: SmolStr },
}

#[derive(Clone, Debug, TypedBuilder)]
pub struct GenerationRequest {
    /// ID of the job, stable across attempts
    pub idempotency_key: Uuid,
    pub modality: Modality,
    #[builder(setter(into))]
    pub prompt: String,
    #[builder(default = 1)]
    pub attempt: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GenerationOutput {
    Text(String),
    Image { bytes: Bytes, content_type: SmolStr },
}

/// Capability that turns a prompt into text or image bytes, or fails
#[async_trait]
pub trait Generator: Send + Sync + 'static {
    fn provider(&self) -> &str;

    fn model_name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput>;
}

#[async_trait]
impl<G> Generator for Arc<G>
where
    G: Generator + ?Sized,
{
    fn provider(&self) -> &str {
        (**self).provider()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        (**self).generate(request).await
    }
}
