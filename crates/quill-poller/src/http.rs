use crate::{error::BoxError, StatusSource};
use async_trait::async_trait;
use quill_type::job::StatusResponse;
use reqwest::{Client, StatusCode};
use uuid::Uuid;

/// Reads the job status from a remote `GET /jobs/{id}` endpoint
#[derive(Clone)]
pub struct HttpStatusSource {
    client: Client,
    base_url: String,
}

impl HttpStatusSource {
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Self { client, base_url }
    }

    fn status_url(&self, job_id: Uuid) -> String {
        format!("{}/jobs/{job_id}", self.base_url)
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch_status(&self, job_id: Uuid) -> Result<Option<StatusResponse>, BoxError> {
        let response = self.client.get(self.status_url(job_id)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.error_for_status()?.json().await?;
        Ok(Some(status))
    }
}
