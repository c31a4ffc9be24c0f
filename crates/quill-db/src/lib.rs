use async_trait::async_trait;
use uuid::Uuid;

pub use self::{
    error::{Error, Result},
    memory::InMemoryRecordStore,
    model::{JobRecord, NewJobRecord},
};

mod error;
mod memory;
pub mod model;

/// Durable store of job records
///
/// Writes to the same job are last-write-wins
#[async_trait]
pub trait JobRecordStore: Send + Sync + 'static {
    async fn insert(&self, record: NewJobRecord) -> Result<JobRecord>;

    /// Record that the `attempt`-th (1-based) attempt started
    async fn mark_processing(&self, job_id: Uuid, attempt: u32) -> Result<()>;

    /// Put the record back to queued after a failed attempt that is going to be retried
    async fn mark_queued(&self, job_id: Uuid, attempts: u32) -> Result<()>;

    async fn mark_completed(
        &self,
        job_id: Uuid,
        result: serde_json::Value,
        attempts: u32,
    ) -> Result<()>;

    async fn mark_failed(&self, job_id: Uuid, error: String, attempts: u32) -> Result<()>;

    async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>>;

    /// Most recent jobs of the tenant, newest first
    async fn list_for_tenant(&self, tenant_id: &str, limit: usize) -> Result<Vec<JobRecord>>;
}
