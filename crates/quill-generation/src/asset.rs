use crate::Result;
use ahash::AHashMap;
use async_trait::async_trait;
use bytes::Bytes;
use smol_str::SmolStr;
use std::sync::{PoisonError, RwLock};

/// Object storage the generated images get uploaded to
#[async_trait]
pub trait AssetSink: Send + Sync + 'static {
    /// Store the asset and return the URL it is reachable under
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<String>;
}

#[derive(Default)]
pub struct InMemoryAssetSink {
    assets: RwLock<AHashMap<String, (SmolStr, Bytes)>>,
}

impl InMemoryAssetSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<(SmolStr, Bytes)> {
        self.assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl AssetSink for InMemoryAssetSink {
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<String> {
        self.assets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), (content_type.into(), bytes));

        Ok(format!("memory://{key}"))
    }
}
