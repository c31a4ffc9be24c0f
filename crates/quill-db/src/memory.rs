use crate::{
    error::{Error, Result},
    model::{snippet_of, JobRecord, NewJobRecord},
    JobRecordStore,
};
use ahash::AHashMap;
use async_trait::async_trait;
use quill_type::job::JobStatus;
use std::sync::{PoisonError, RwLock};
use tick_tock_mock::Clock;
use uuid::Uuid;

/// Record store keeping everything in a map
#[derive(Default)]
pub struct InMemoryRecordStore {
    clock: Clock,
    records: RwLock<AHashMap<Uuid, JobRecord>>,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            clock,
            records: RwLock::default(),
        }
    }

    fn update<F>(&self, job_id: Uuid, func: F) -> Result<()>
    where
        F: FnOnce(&mut JobRecord),
    {
        let now = self.clock.now();
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let record = records.get_mut(&job_id).ok_or(Error::NotFound(job_id))?;

        func(record);
        record.updated_at = now;

        Ok(())
    }
}

#[async_trait]
impl JobRecordStore for InMemoryRecordStore {
    async fn insert(&self, record: NewJobRecord) -> Result<JobRecord> {
        let now = self.clock.now();
        let record = JobRecord {
            job_id: record.job_id,
            tenant_id: record.tenant_id,
            user_id: record.user_id,
            job_type: record.job_type,
            provider: record.provider,
            model_name: record.model_name,
            status: JobStatus::Queued,
            attempts: 0,
            result: None,
            result_snippet: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&record.job_id) {
            return Err(Error::Duplicate(record.job_id));
        }
        records.insert(record.job_id, record.clone());

        Ok(record)
    }

    async fn mark_processing(&self, job_id: Uuid, attempt: u32) -> Result<()> {
        self.update(job_id, |record| {
            record.status = JobStatus::Processing;
            record.attempts = attempt;
        })
    }

    async fn mark_queued(&self, job_id: Uuid, attempts: u32) -> Result<()> {
        self.update(job_id, |record| {
            record.status = JobStatus::Queued;
            record.attempts = attempts;
        })
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        result: serde_json::Value,
        attempts: u32,
    ) -> Result<()> {
        let now = self.clock.now();
        self.update(job_id, |record| {
            record.status = JobStatus::Completed;
            record.attempts = attempts;
            record.result_snippet = Some(snippet_of(&result));
            record.result = Some(result);
            record.error_message = None;
            record.completed_at = Some(now);
        })
    }

    async fn mark_failed(&self, job_id: Uuid, error: String, attempts: u32) -> Result<()> {
        let now = self.clock.now();
        self.update(job_id, |record| {
            record.status = JobStatus::Failed;
            record.attempts = attempts;
            record.result = None;
            record.result_snippet = None;
            record.error_message = Some(error);
            record.completed_at = Some(now);
        })
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(&job_id).cloned())
    }

    async fn list_for_tenant(&self, tenant_id: &str, limit: usize) -> Result<Vec<JobRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut tenant_records: Vec<JobRecord> = records
            .values()
            .filter(|record| record.tenant_id == tenant_id)
            .cloned()
            .collect();

        // UUIDv7 sorts by creation time
        tenant_records.sort_unstable_by(|lhs, rhs| rhs.job_id.cmp(&lhs.job_id));
        tenant_records.truncate(limit);

        Ok(tenant_records)
    }
}
