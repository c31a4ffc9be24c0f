use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    response::{IntoResponse, Response},
};
use http::request::Parts;
use quill_error::{Error, ErrorType};
use serde::de::DeserializeOwned;
use smol_str::SmolStr;

const TENANT_HEADER: &str = "x-tenant-id";
const USER_HEADER: &str = "x-user-id";

/// Tenant and user the request is made on behalf of
///
/// Set by the authentication layer in front of the service
pub struct Attribution {
    pub tenant_id: SmolStr,
    pub user_id: SmolStr,
}

fn header_value(parts: &Parts, name: &str) -> Option<SmolStr> {
    let value = parts.headers.get(name)?.to_str().ok()?.trim();
    (!value.is_empty()).then(|| SmolStr::from(value))
}

impl<S> FromRequestParts<S> for Attribution
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let (Some(tenant_id), Some(user_id)) =
            (header_value(parts, TENANT_HEADER), header_value(parts, USER_HEADER))
        else {
            quill_error::bail!(type = ErrorType::Unauthorized, "missing attribution headers");
        };

        Ok(Self { tenant_id, user_id })
    }
}

/// JSON body whose rejections use the JSON error format
pub struct Json<T>(pub T);

impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(JsonRejection::MissingJsonContentType(rejection)) => Err(rejection.into_response()),
            Err(rejection) => {
                debug!(error = %rejection.body_text(), "failed to parse JSON payload");
                Err(Error::bad_request(rejection.body_text()).into_response())
            }
        }
    }
}
