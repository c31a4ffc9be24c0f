use thiserror::Error;
use uuid::Uuid;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("job failed: {reason}")]
    Failed { reason: String },

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Source(BoxError),

    #[error("job is stuck: {reason}")]
    Stuck { reason: String },

    #[error("job didn't finish after {attempts} status checks")]
    TimedOut { attempts: u32 },
}
