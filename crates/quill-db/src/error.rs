use thiserror::Error;
use uuid::Uuid;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Backend(BoxError),

    #[error("job record {0} already exists")]
    Duplicate(Uuid),

    #[error("job record {0} not found")]
    NotFound(Uuid),
}
