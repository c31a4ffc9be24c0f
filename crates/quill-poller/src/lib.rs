#[macro_use]
extern crate tracing;

use async_trait::async_trait;
use quill_type::job::{JobStatus, StatusResponse};
use std::{sync::Arc, time::Duration};
use tick_tock_mock::Clock;
use typed_builder::TypedBuilder;
use uuid::Uuid;

pub use self::{
    error::{BoxError, Error, Result},
    http::HttpStatusSource,
};

mod error;
mod http;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1500);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 400;

/// Anything that can answer a status query for a job
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// `None` if the job is unknown
    async fn fetch_status(&self, job_id: Uuid) -> Result<Option<StatusResponse>, BoxError>;
}

#[async_trait]
impl<S> StatusSource for Arc<S>
where
    S: StatusSource + ?Sized,
{
    async fn fetch_status(&self, job_id: Uuid) -> Result<Option<StatusResponse>, BoxError> {
        (**self).fetch_status(job_id).await
    }
}

#[async_trait]
impl<S> StatusSource for &S
where
    S: StatusSource + ?Sized,
{
    async fn fetch_status(&self, job_id: Uuid) -> Result<Option<StatusResponse>, BoxError> {
        (**self).fetch_status(job_id).await
    }
}

/// Waits for a job to finish by checking its status on a fixed interval
///
/// Dropping the future returned by [`Poller::poll`] abandons the polling, the job itself keeps running
#[derive(TypedBuilder)]
pub struct Poller<S> {
    source: S,
    #[builder(default = DEFAULT_INTERVAL)]
    interval: Duration,
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,
    /// Give up once this much time passed since polling started
    #[builder(default, setter(strip_option))]
    deadline: Option<Duration>,
    #[builder(default)]
    clock: Clock,
}

impl<S> Poller<S>
where
    S: StatusSource,
{
    #[must_use]
    pub fn from_configuration(source: S, config: &quill_config::poller::Configuration) -> Self {
        Self::builder()
            .source(source)
            .interval(config.interval())
            .max_attempts(config.max_attempts)
            .build()
    }

    /// Resolve with the result of the job once it completed
    #[instrument(skip(self))]
    pub async fn poll(&self, job_id: Uuid) -> Result<serde_json::Value> {
        let started_at = self.clock.now();
        let mut attempts = 0;

        loop {
            attempts += 1;

            let status = self
                .source
                .fetch_status(job_id)
                .await
                .map_err(Error::Source)?
                .ok_or(Error::NotFound(job_id))?;

            trace!(attempts, status = %status.status, progress = ?status.progress, "polled job");

            match status.status {
                JobStatus::Completed => {
                    return Ok(status.result.unwrap_or(serde_json::Value::Null));
                }
                JobStatus::Failed => {
                    return Err(Error::Failed {
                        reason: status.error.unwrap_or_else(|| "unknown error".into()),
                    });
                }
                JobStatus::Stuck => {
                    return Err(Error::Stuck {
                        reason: status
                            .error
                            .unwrap_or_else(|| "job isn't making progress".into()),
                    });
                }
                JobStatus::Queued | JobStatus::Processing => {}
            }

            if attempts >= self.max_attempts {
                break;
            }

            if let Some(deadline) = self.deadline {
                if self.clock.elapsed_since(started_at) + self.interval > deadline {
                    break;
                }
            }

            self.clock.sleep(self.interval).await;
        }

        debug!(attempts, "giving up on job");
        Err(Error::TimedOut { attempts })
    }
}
