use clap::Parser;
use color_eyre::eyre;
use quill_config::Configuration;
use std::path::PathBuf;

/// Asynchronous content generation service
#[derive(Parser)]
#[command(about, author, version)]
struct Args {
    /// Path to the configuration file
    #[clap(long, short)]
    config: PathBuf,
}

async fn boot() -> eyre::Result<()> {
    let args = Args::parse();
    let config = Configuration::load(args.config).await?;
    quill_observability::initialise()?;

    let (state, job_system) = quill::initialise_state(&config).await?;
    let shutdown_signal = quill::signal::shutdown();

    let server_result = quill::http::run(state, config.server.clone(), shutdown_signal).await;
    job_system.shutdown().await;

    server_result
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(boot())
}
