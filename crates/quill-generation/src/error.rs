use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The provider failed in a way that might go away on its own
    #[error("provider unavailable: {0}")]
    Transient(String),

    #[error(transparent)]
    Storage(BoxError),
}
