use quill_type::job::JobStatus;
use smol_str::SmolStr;
use std::time::SystemTime;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Maximum length of the result preview in characters
pub const SNIPPET_LENGTH: usize = 280;

#[derive(Clone, Debug, PartialEq)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub tenant_id: SmolStr,
    pub user_id: SmolStr,
    pub job_type: SmolStr,
    pub provider: SmolStr,
    pub model_name: SmolStr,
    pub status: JobStatus,
    pub attempts: u32,
    pub result: Option<serde_json::Value>,
    pub result_snippet: Option<String>,
    pub error_message: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub completed_at: Option<SystemTime>,
}

#[derive(Clone, Debug, TypedBuilder)]
pub struct NewJobRecord {
    pub job_id: Uuid,
    #[builder(setter(into))]
    pub tenant_id: SmolStr,
    #[builder(setter(into))]
    pub user_id: SmolStr,
    #[builder(setter(into))]
    pub job_type: SmolStr,
    #[builder(setter(into))]
    pub provider: SmolStr,
    #[builder(setter(into))]
    pub model_name: SmolStr,
}

/// Short human-readable preview of a job result
///
/// Uses the `text` field if present, the whole JSON document otherwise
#[must_use]
pub fn snippet_of(result: &serde_json::Value) -> String {
    let full = match result.get("text").and_then(serde_json::Value::as_str) {
        Some(text) => text.to_string(),
        None => result.to_string(),
    };

    full.chars().take(SNIPPET_LENGTH).collect()
}
