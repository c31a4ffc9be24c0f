use crate::{GenerationOutput, GenerationRequest, Generator, Modality, Result};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use smol_str::SmolStr;
use std::{
    hash::{BuildHasher, Hasher},
    time::Duration,
};
use typed_builder::TypedBuilder;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Deterministic provider that answers from templates
///
/// Stands in for a third-party model in development and tests
#[derive(Clone, TypedBuilder)]
pub struct TemplateGenerator {
    #[builder(default = "template".into(), setter(into))]
    provider: SmolStr,
    #[builder(default = "template-v1".into(), setter(into))]
    model_name: SmolStr,
    #[builder(default)]
    latency: Duration,
}

impl TemplateGenerator {
    fn render_text(&self, prompt: &str) -> String {
        let mut text = String::with_capacity(prompt.len() + 32);
        for line in prompt.lines().map(str::trim).filter(|line| !line.is_empty()) {
            text.push_str("- ");
            text.push_str(line);
            text.push('\n');
        }
        text.push_str("(generated by ");
        text.push_str(&self.model_name);
        text.push(')');

        text
    }

    fn render_image(prompt: &str, size: &str) -> BytesMut {
        let seed = ahash::RandomState::with_seeds(1, 2, 3, 4);
        let mut hasher = seed.build_hasher();
        hasher.write(prompt.as_bytes());
        hasher.write(size.as_bytes());

        let mut bytes = BytesMut::with_capacity(PNG_SIGNATURE.len() + 8 + size.len());
        bytes.put_slice(PNG_SIGNATURE);
        bytes.put_u64(hasher.finish());
        bytes.put_slice(size.as_bytes());

        bytes
    }
}

#[async_trait]
impl Generator for TemplateGenerator {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let output = match request.modality {
            Modality::Text => GenerationOutput::Text(self.render_text(&request.prompt)),
            Modality::Image { ref size } => GenerationOutput::Image {
                bytes: Self::render_image(&request.prompt, size).freeze(),
                content_type: "image/png".into(),
            },
        };

        Ok(output)
    }
}
