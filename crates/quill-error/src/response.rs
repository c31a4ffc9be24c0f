use crate::{Error, ErrorType};
use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.ty {
            ErrorType::Other(..) => error!(error = ?self.inner, "request failed"),
            _ => debug!(error = ?self.inner),
        }

        let status_code = self.ty.status_code();
        // Internal details stay in the logs
        let error = self
            .ty
            .public_message()
            .or_else(|| status_code.canonical_reason())
            .unwrap_or("error");

        (status_code, Json(ErrorBody { error })).into_response()
    }
}

#[cfg(test)]
mod test {
    use crate::{Error, ErrorType};
    use axum::response::IntoResponse;
    use http::StatusCode;
    use http_body_util::BodyExt;

    async fn body_of(error: Error) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn bad_request_carries_message() {
        let error = crate::quill_error!(
            type = ErrorType::BadRequest(Some("topic is required".into())),
            "validation failed"
        );

        let (status, body) = body_of(error).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "topic is required");
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let error = Error::msg("connection refused by 10.0.0.3");

        let (status, body) = body_of(error).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal Server Error");
    }

    #[tokio::test]
    async fn unauthorized() {
        let error = crate::quill_error!(type = ErrorType::Unauthorized, "missing x-tenant-id");

        let (status, body) = body_of(error).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn not_found() {
        let error = Error::msg("gone").with_error_type(ErrorType::NotFound);

        let (status, body) = body_of(error).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not Found");
    }
}
