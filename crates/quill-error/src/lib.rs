#[macro_use]
extern crate tracing;

use http::StatusCode;
use std::fmt::{self, Debug, Display};

mod response;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[macro_export]
macro_rules! bail {
    ($(type = $type:expr,)? $msg:expr) => {
        return Err($crate::quill_error!($(type = $type,)? $msg));
    };
}

#[macro_export]
macro_rules! quill_error {
    (type = $type:expr, $msg:expr) => {
        $crate::Error::msg($msg).with_error_type($type)
    };
    ($msg:expr) => {
        $crate::quill_error!(type = $crate::ErrorType::Other(None), $msg)
    };
}

/// Category of the error, decides the status code of the HTTP response
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorType {
    /// The request was rejected before anything got created
    ///
    /// The message is sent to the client
    BadRequest(Option<String>),
    NotFound,
    /// The request lacks tenant/user attribution
    Unauthorized,
    Other(Option<String>),
}

impl ErrorType {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(..) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Other(..) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client, if any
    #[must_use]
    pub fn public_message(&self) -> Option<&str> {
        match self {
            Self::BadRequest(message) | Self::Other(message) => message.as_deref(),
            Self::NotFound | Self::Unauthorized => None,
        }
    }
}

/// Application error, an [`eyre::Report`] tagged with the [`ErrorType`] it maps to
#[derive(Debug)]
pub struct Error {
    ty: ErrorType,
    inner: eyre::Report,
}

impl Error {
    #[inline]
    pub fn new<E>(ty: ErrorType, err: E) -> Self
    where
        E: Into<eyre::Report>,
    {
        Self {
            ty,
            inner: err.into(),
        }
    }

    #[inline]
    pub fn msg<M>(msg: M) -> Self
    where
        M: Debug + Display + Send + Sync + 'static,
    {
        eyre::Report::msg(msg).into()
    }

    /// Rejected input, the message is passed on to the client verbatim
    pub fn bad_request<M>(message: M) -> Self
    where
        M: Into<String>,
    {
        let message = message.into();
        Self::new(ErrorType::BadRequest(Some(message.clone())), eyre::Report::msg(message))
    }

    #[must_use]
    pub fn error_type(&self) -> &ErrorType {
        &self.ty
    }

    pub fn error(&self) -> &eyre::Report {
        &self.inner
    }

    #[must_use]
    pub fn with_error_type(self, ty: ErrorType) -> Self {
        Self { ty, ..self }
    }
}

impl<T> From<T> for Error
where
    T: Into<eyre::Report>,
{
    fn from(value: T) -> Self {
        Self {
            ty: ErrorType::Other(None),
            inner: value.into(),
        }
    }
}

impl From<Error> for BoxError {
    fn from(value: Error) -> Self {
        BoxError::from(value.inner)
    }
}

impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <eyre::Report as fmt::Display>::fmt(&self.inner, f)
    }
}
