use crate::http::extractor::{Attribution, Json};
use axum::{debug_handler, extract::Path, extract::State, response::IntoResponse};
use http::StatusCode;
use quill_error::{ErrorType, Result};
use quill_service::{JobService, Submission};
use quill_type::job::{StatusResponse, SubmitRequest};
use uuid::Uuid;

fn service_error(err: quill_service::Error) -> quill_error::Error {
    let ty = err.error_type();
    quill_error::Error::new(ty, err)
}

#[debug_handler(state = crate::state::Zustand)]
pub async fn post(
    State(job_service): State<JobService>,
    attribution: Attribution,
    Json(request): Json<SubmitRequest>,
) -> Result<impl IntoResponse> {
    let submission = Submission::builder()
        .tenant_id(attribution.tenant_id)
        .user_id(attribution.user_id)
        .job_type(request.job_type)
        .payload(request.payload)
        .build();

    let response = job_service
        .submit(submission)
        .await
        .map_err(service_error)?;

    Ok((StatusCode::ACCEPTED, axum::Json(response)))
}

#[debug_handler(state = crate::state::Zustand)]
pub async fn get(
    State(job_service): State<JobService>,
    Path(job_id): Path<String>,
) -> Result<axum::Json<StatusResponse>> {
    // Anything that isn't a UUID can't name a job
    let Ok(job_id) = job_id.parse::<Uuid>() else {
        quill_error::bail!(type = ErrorType::NotFound, "invalid job id");
    };

    let status = job_service.status(job_id).await.map_err(service_error)?;
    Ok(axum::Json(status))
}
