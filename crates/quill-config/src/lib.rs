pub mod generation;
pub mod job_queue;
pub mod poller;
pub mod server;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    pub server: server::Configuration,
    pub job_queue: job_queue::Configuration,
    #[serde(default)]
    pub generation: generation::Configuration,
    #[serde(default)]
    pub poller: poller::Configuration,
}

impl Configuration {
    pub async fn load<P>(path: P) -> eyre::Result<Self>
    where
        P: AsRef<Path>,
    {
        let content = fs::read_to_string(path).await?;
        content.parse()
    }
}

impl std::str::FromStr for Configuration {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(eyre::Report::from)
    }
}
