use std::error::Error as StdError;
use thiserror::Error;
use uuid::Uuid;

pub type BoxError = Box<dyn StdError + Send + Sync>;
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    ContextRepository(BoxError),

    #[error("job {0} already exists")]
    DuplicateJob(Uuid),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("malformed job data: {0}")]
    MalformedJob(String),

    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}
