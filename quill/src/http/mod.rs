use crate::{signal, state::Zustand};
use axum::{routing, Router};
use eyre::Context;
use quill_config::server;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

mod extractor;
mod handler;

pub fn create_router(state: Zustand, server_config: &server::Configuration) -> Router {
    Router::new()
        .route("/health", routing::get(handler::health::get))
        .route("/jobs", routing::post(handler::jobs::post))
        .route("/jobs/{job_id}", routing::get(handler::jobs::get))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            server_config.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[instrument(skip_all, fields(address = %server_config.bind_address))]
pub async fn run(
    state: Zustand,
    server_config: server::Configuration,
    shutdown_signal: signal::Receiver,
) -> eyre::Result<()> {
    let router = create_router(state, &server_config);
    let listener = TcpListener::bind(server_config.bind_address)
        .await
        .wrap_err("Failed to bind the HTTP listener")?;

    info!("listening for requests");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal.wait())
        .await?;

    Ok(())
}
