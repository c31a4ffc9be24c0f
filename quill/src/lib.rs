#[macro_use]
extern crate tracing;

use self::state::{Service, Zustand};
use eyre::Context;
use quill_config::Configuration;
use quill_db::InMemoryRecordStore;
use quill_generation::{Deduplicating, Generator, InMemoryAssetSink, TemplateGenerator};
use quill_job_runner::JobSystem;
use quill_jobs::JobRunnerContext;
use quill_service::JobService;
use std::sync::Arc;
use tick_tock_mock::Clock;

pub mod http;
pub mod signal;
pub mod state;

fn prepare_generator(config: &quill_config::generation::Configuration) -> Arc<dyn Generator> {
    let generator = TemplateGenerator::builder()
        .provider(config.provider.clone())
        .model_name(config.model_name.clone())
        .latency(config.simulated_latency())
        .build();

    if config.deduplicate {
        Arc::new(Deduplicating::new(generator, config.dedup_ttl()))
    } else {
        Arc::new(generator)
    }
}

/// Wire up the services and start the job system
pub async fn initialise_state(config: &Configuration) -> eyre::Result<(Zustand, JobSystem)> {
    initialise_state_with(config, prepare_generator(&config.generation)).await
}

/// Same as [`initialise_state`] but with a custom generation provider
pub async fn initialise_state_with(
    config: &Configuration,
    generator: Arc<dyn Generator>,
) -> eyre::Result<(Zustand, JobSystem)> {
    let clock = Clock::new();
    let record_store = Arc::new(InMemoryRecordStore::with_clock(clock.clone()));

    let queues = quill_job_runner::prepare_job_queues(&config.job_queue, clock.clone())
        .await
        .wrap_err("Failed to set up the job queues")?;

    let job_service = JobService::builder()
        .queues(queues.clone())
        .record_store(record_store.clone())
        .provider(generator.provider())
        .model_name(generator.model_name())
        .stuck_after(config.job_queue.stuck_after())
        .clock(clock)
        .build();

    let runner_ctx = JobRunnerContext::builder()
        .asset_sink(Arc::new(InMemoryAssetSink::new()))
        .generator(generator)
        .record_store(record_store)
        .build();
    let job_system = JobSystem::start(queues, runner_ctx, &config.job_queue);

    let state = Zustand {
        service: Service { job: job_service },
    };

    Ok((state, job_system))
}
