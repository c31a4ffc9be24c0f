use quill_error::ErrorType;
use quill_jobs::PayloadError;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Queue(#[from] ergane::Error),

    #[error(transparent)]
    Record(#[from] quill_db::Error),
}

impl Error {
    /// Category used when the error is turned into an HTTP response
    #[must_use]
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::NotFound(..) => ErrorType::NotFound,
            Self::Payload(err) => ErrorType::BadRequest(Some(err.to_string())),
            Self::Queue(..) | Self::Record(..) => ErrorType::Other(None),
        }
    }
}
