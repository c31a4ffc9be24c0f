use garde::Validate;
use quill_generation::Modality;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use strum::AsRefStr;

const MAX_META_TITLE_LENGTH: usize = 60;
const MAX_META_DESCRIPTION_LENGTH: usize = 155;

#[allow(clippy::trivially_copy_pass_by_ref)]
fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }

    Ok(())
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BlogOutline {
    #[garde(custom(not_blank), length(chars, min = 1, max = 64))]
    pub brand_voice: String,
    #[garde(custom(not_blank), length(chars, min = 1, max = 200))]
    pub topic: String,
    #[serde(default)]
    #[garde(length(chars, max = 200))]
    pub audience: Option<String>,
    #[serde(default)]
    #[garde(range(min = 3, max = 12))]
    pub sections: Option<u8>,
}

impl BlogOutline {
    pub(crate) fn prompt(&self) -> String {
        let mut prompt = format!(
            "Blog outline about {}\nVoice: {}\n",
            self.topic, self.brand_voice
        );
        if let Some(ref audience) = self.audience {
            let _ = writeln!(prompt, "Audience: {audience}");
        }
        if let Some(sections) = self.sections {
            let _ = writeln!(prompt, "Sections: {sections}");
        }

        prompt
    }
}

#[derive(AsRefStr, Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    #[default]
    Twitter,
    Linkedin,
    Instagram,
    Facebook,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SocialCaption {
    #[garde(custom(not_blank), length(chars, min = 1, max = 64))]
    pub brand_voice: String,
    #[garde(custom(not_blank), length(chars, min = 1, max = 200))]
    pub topic: String,
    #[serde(default)]
    #[garde(skip)]
    pub platform: Platform,
    #[serde(default = "default_true")]
    #[garde(skip)]
    pub include_hashtags: bool,
}

impl SocialCaption {
    pub(crate) fn prompt(&self) -> String {
        let mut prompt = format!(
            "{} caption about {}\nVoice: {}\n",
            self.platform.as_ref(),
            self.topic,
            self.brand_voice
        );
        if self.include_hashtags {
            prompt.push_str("Include hashtags\n");
        }

        prompt
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SeoMetadata {
    #[garde(custom(not_blank), length(chars, min = 1, max = 200))]
    pub title: String,
    #[garde(custom(not_blank), length(chars, min = 1, max = 10_000))]
    pub content: String,
    #[serde(default)]
    #[garde(length(max = 10))]
    pub keywords: Vec<String>,
}

impl SeoMetadata {
    pub(crate) fn prompt(&self) -> String {
        let mut prompt = format!("SEO metadata for {}\n{}\n", self.title, self.content);
        if !self.keywords.is_empty() {
            let _ = writeln!(prompt, "Keywords: {}", self.keywords.join(", "));
        }

        prompt
    }

    pub(crate) fn meta_title(&self) -> String {
        self.title.chars().take(MAX_META_TITLE_LENGTH).collect()
    }

    pub(crate) fn meta_description(text: &str) -> String {
        let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        single_line.chars().take(MAX_META_DESCRIPTION_LENGTH).collect()
    }
}

#[derive(AsRefStr, Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub enum ImageSize {
    #[serde(rename = "256x256")]
    #[strum(serialize = "256x256")]
    Small,
    #[serde(rename = "512x512")]
    #[strum(serialize = "512x512")]
    Medium,
    #[default]
    #[serde(rename = "1024x1024")]
    #[strum(serialize = "1024x1024")]
    Large,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImageGenerate {
    #[garde(custom(not_blank), length(chars, min = 1, max = 1000))]
    pub prompt: String,
    #[serde(default)]
    #[garde(length(chars, max = 64))]
    pub style: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub size: ImageSize,
}

impl ImageGenerate {
    pub(crate) fn prompt(&self) -> String {
        match self.style {
            Some(ref style) => format!("{}\nStyle: {style}\n", self.prompt),
            None => self.prompt.clone(),
        }
    }

    pub(crate) fn modality(&self) -> Modality {
        Modality::Image {
            size: self.size.as_ref().into(),
        }
    }
}
