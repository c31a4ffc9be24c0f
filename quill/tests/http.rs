use async_trait::async_trait;
use axum::{body::Body, Router};
use http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use quill_config::Configuration;
use quill_generation::{
    Error as GenerationError, GenerationOutput, GenerationRequest, Generator, TemplateGenerator,
};
use quill_job_runner::JobSystem;
use quill_poller::{BoxError, Error as PollError, Poller, StatusSource};
use quill_type::job::{JobStatus, StatusResponse, SubmitResponse};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;
use uuid::Uuid;

const CONFIG: &str = r#"
    [server]
    bind-address = "127.0.0.1:0"

    [job-queue.backend]
    type = "in-memory"

    [job-queue.text]
    backoff-base-ms = 10

    [job-queue.image]
    backoff-base-ms = 10
"#;

struct AlwaysFailing;

#[async_trait]
impl Generator for AlwaysFailing {
    fn provider(&self) -> &str {
        "flaky"
    }

    fn model_name(&self) -> &str {
        "flaky-v1"
    }

    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> quill_generation::Result<GenerationOutput> {
        Err(GenerationError::Transient("quota exceeded".into()))
    }
}

async fn app(generator: Arc<dyn Generator>) -> (Router, JobSystem) {
    let config: Configuration = CONFIG.parse().unwrap();
    let (state, job_system) = quill::initialise_state_with(&config, generator)
        .await
        .unwrap();

    (quill::http::create_router(state, &config.server), job_system)
}

async fn template_app() -> (Router, JobSystem) {
    app(Arc::new(TemplateGenerator::builder().build())).await
}

fn submit_request(body: &Value) -> Request<Body> {
    Request::post("/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-tenant-id", "acme")
        .header("x-user-id", "editor")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn submit(router: &Router, body: &Value) -> SubmitResponse {
    let response = router.clone().oneshot(submit_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    serde_json::from_value(json_body(response).await).unwrap()
}

/// Polls through the HTTP router
struct RouterSource(Router);

#[async_trait]
impl StatusSource for RouterSource {
    async fn fetch_status(&self, job_id: Uuid) -> Result<Option<StatusResponse>, BoxError> {
        let request = Request::get(format!("/jobs/{job_id}")).body(Body::empty())?;
        let response = self.0.clone().oneshot(request).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::OK => {
                let body = response.into_body().collect().await?.to_bytes();
                Ok(Some(serde_json::from_slice(&body)?))
            }
            status => Err(format!("unexpected status code {status}").into()),
        }
    }
}

fn poller(router: &Router) -> Poller<RouterSource> {
    Poller::builder()
        .source(RouterSource(router.clone()))
        .interval(Duration::from_millis(20))
        .deadline(Duration::from_secs(10))
        .build()
}

#[tokio::test(flavor = "multi_thread")]
async fn blog_outline_completes() {
    let (router, job_system) = template_app().await;

    let submitted = submit(
        &router,
        &json!({
            "type": "text-blog-outline",
            "payload": { "brandVoice": "friendly", "topic": "Spring launch" },
        }),
    )
    .await;
    assert_eq!(submitted.status, JobStatus::Queued);

    let result = poller(&router).poll(submitted.job_id).await.unwrap();
    let text = result["text"].as_str().unwrap();
    assert!(!text.is_empty());

    let status = RouterSource(router.clone())
        .fetch_status(submitted.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.attempts, 1);
    assert_eq!(status.error, None);
    assert!(status.completed_at.is_some());

    job_system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn image_job_returns_asset_url() {
    let (router, job_system) = template_app().await;

    let submitted = submit(
        &router,
        &json!({
            "type": "image-generate",
            "payload": { "prompt": "a lighthouse at dusk", "size": "512x512" },
        }),
    )
    .await;

    let result = poller(&router).poll(submitted.job_id).await.unwrap();
    assert_eq!(result["contentType"], "image/png");
    assert_eq!(result["size"], "512x512");
    assert!(result["url"].as_str().unwrap().starts_with("memory://"));

    job_system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_field_is_bad_request() {
    let (router, job_system) = template_app().await;

    let response = router
        .clone()
        .oneshot(submit_request(&json!({
            "type": "text-blog-outline",
            "payload": { "brandVoice": "friendly" },
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("topic"));

    job_system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_job_type_is_bad_request() {
    let (router, job_system) = template_app().await;

    let response = router
        .clone()
        .oneshot(submit_request(&json!({
            "type": "video-generate",
            "payload": {},
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    job_system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_attribution_is_unauthorized() {
    let (router, job_system) = template_app().await;

    let request = Request::post("/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "type": "text-blog-outline",
                "payload": { "brandVoice": "friendly", "topic": "Spring launch" },
            })
            .to_string(),
        ))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    job_system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_provider_ends_failed() {
    let (router, job_system) = app(Arc::new(AlwaysFailing)).await;

    let submitted = submit(
        &router,
        &json!({
            "type": "text-social-caption",
            "payload": { "brandVoice": "bold", "topic": "Summer sale", "platform": "linkedin" },
        }),
    )
    .await;

    let error = poller(&router).poll(submitted.job_id).await.unwrap_err();
    let PollError::Failed { reason } = error else {
        panic!("expected the job to fail, got {error:?}");
    };
    assert_eq!(reason, "provider unavailable: quota exceeded");

    let status = RouterSource(router.clone())
        .fetch_status(submitted.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.attempts, 3);
    assert_eq!(status.result, None);

    job_system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_job_is_not_found() {
    let (router, job_system) = template_app().await;

    for path in [format!("/jobs/{}", Uuid::now_v7()), "/jobs/not-a-uuid".into()] {
        let request = Request::get(path).body(Body::empty()).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await, json!({ "error": "Not Found" }));
    }

    job_system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check() {
    let (router, job_system) = template_app().await;

    let request = Request::get("/health").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    job_system.shutdown().await;
}
