use crate::{
    payload::{BlogOutline, ImageGenerate, SeoMetadata, SocialCaption},
    GenerationJob,
};
use garde::Validate;
use serde::de::DeserializeOwned;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("unknown job type {0:?}")]
    UnknownKind(String),

    #[error("malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("invalid payload: {0}")]
    Invalid(#[source] garde::Report),
}

#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, PartialEq)]
#[strum(serialize_all = "kebab-case")]
pub enum JobKind {
    TextBlogOutline,
    TextSocialCaption,
    TextSeoMetadata,
    ImageGenerate,
}

#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumIter, Eq, Hash, PartialEq)]
#[strum(serialize_all = "kebab-case")]
pub enum QueueKind {
    TextGeneration,
    ImageGeneration,
}

pub struct KindDescriptor {
    pub kind: JobKind,
    pub queue: QueueKind,
    parse: fn(serde_json::Value) -> Result<GenerationJob, PayloadError>,
}

impl KindDescriptor {
    /// Deserialise and validate the payload of this kind
    pub fn parse(&self, payload: serde_json::Value) -> Result<GenerationJob, PayloadError> {
        (self.parse)(payload)
    }
}

fn parse_payload<P>(payload: serde_json::Value) -> Result<GenerationJob, PayloadError>
where
    P: DeserializeOwned + Validate<Context = ()> + Into<GenerationJob>,
{
    let payload: P = serde_json::from_value(payload).map_err(PayloadError::Malformed)?;
    payload.validate().map_err(PayloadError::Invalid)?;

    Ok(payload.into())
}

// Indexed by the discriminant of `JobKind`
static DESCRIPTORS: [KindDescriptor; 4] = [
    KindDescriptor {
        kind: JobKind::TextBlogOutline,
        queue: QueueKind::TextGeneration,
        parse: parse_payload::<BlogOutline>,
    },
    KindDescriptor {
        kind: JobKind::TextSocialCaption,
        queue: QueueKind::TextGeneration,
        parse: parse_payload::<SocialCaption>,
    },
    KindDescriptor {
        kind: JobKind::TextSeoMetadata,
        queue: QueueKind::TextGeneration,
        parse: parse_payload::<SeoMetadata>,
    },
    KindDescriptor {
        kind: JobKind::ImageGenerate,
        queue: QueueKind::ImageGeneration,
        parse: parse_payload::<ImageGenerate>,
    },
];

impl JobKind {
    #[must_use]
    pub fn descriptor(self) -> &'static KindDescriptor {
        &DESCRIPTORS[self as usize]
    }

    #[must_use]
    pub fn queue(self) -> QueueKind {
        self.descriptor().queue
    }

    pub fn parse(name: &str) -> Result<Self, PayloadError> {
        name.parse()
            .map_err(|_| PayloadError::UnknownKind(name.to_string()))
    }
}
