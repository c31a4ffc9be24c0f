use ergane::{JobSnapshot, JobState};
use iso8601_timestamp::Timestamp;
use quill_db::JobRecord;
use quill_type::job::{JobStatus, StatusResponse};
use std::{cmp, time::SystemTime};
use uuid::Uuid;

/// What a single source knows about a job
#[derive(Clone, Debug)]
pub(crate) struct Observation {
    pub status: JobStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub progress: Option<u8>,
    pub attempts: u32,
    pub created_at: SystemTime,
    pub completed_at: Option<SystemTime>,
    pub last_update: SystemTime,
}

impl From<JobSnapshot> for Observation {
    fn from(snapshot: JobSnapshot) -> Self {
        let status = match snapshot.state {
            JobState::Waiting | JobState::Delayed => JobStatus::Queued,
            JobState::Active => JobStatus::Processing,
            JobState::Completed => JobStatus::Completed,
            JobState::Failed => JobStatus::Failed,
        };

        let last_update = [snapshot.processed_at, snapshot.finished_at]
            .into_iter()
            .flatten()
            .fold(snapshot.created_at, cmp::max);

        Self {
            status,
            result: snapshot.output,
            error: snapshot.failed_reason,
            progress: Some(snapshot.progress),
            attempts: snapshot.attempts_made,
            created_at: snapshot.created_at,
            completed_at: snapshot.finished_at,
            last_update,
        }
    }
}

impl From<JobRecord> for Observation {
    fn from(record: JobRecord) -> Self {
        Self {
            status: record.status,
            result: record.result,
            error: record.error_message,
            progress: None,
            attempts: record.attempts,
            created_at: record.created_at,
            completed_at: record.completed_at,
            last_update: record.updated_at,
        }
    }
}

/// Merge the live queue state with the stored record
///
/// The more advanced status wins. On a tie the record wins for terminal states, the queue otherwise.
pub(crate) fn reconcile(live: Option<Observation>, stored: Option<Observation>) -> Option<Observation> {
    let (live, stored) = match (live, stored) {
        (None, None) => return None,
        (Some(observation), None) | (None, Some(observation)) => return Some(observation),
        (Some(live), Some(stored)) => (live, stored),
    };

    let prefer_stored = stored.status.rank() > live.status.rank()
        || (stored.status.rank() == live.status.rank() && stored.status.is_terminal());
    let (mut winner, other) = if prefer_stored {
        (stored, live)
    } else {
        (live, stored)
    };

    winner.attempts = cmp::max(winner.attempts, other.attempts);
    winner.progress = winner.progress.or(other.progress);
    winner.created_at = cmp::min(winner.created_at, other.created_at);
    winner.completed_at = winner.completed_at.or(other.completed_at);
    winner.last_update = cmp::max(winner.last_update, other.last_update);

    Some(winner)
}

impl Observation {
    /// The queue never reports `stuck`, a queued job that didn't move for too long gets flagged here
    pub(crate) fn flag_stuck(mut self, now: SystemTime, stuck_after: std::time::Duration) -> Self {
        let idle = now.duration_since(self.last_update).unwrap_or_default();
        if self.status == JobStatus::Queued && idle >= stuck_after {
            self.status = JobStatus::Stuck;
            self.error = Some(format!(
                "job wasn't picked up by a worker for {}s",
                idle.as_secs()
            ));
        }

        self
    }

    pub(crate) fn into_response(self, job_id: Uuid) -> StatusResponse {
        let terminal = self.status.is_terminal();

        StatusResponse {
            status: self.status,
            job_id,
            result: (self.status == JobStatus::Completed)
                .then_some(self.result)
                .flatten(),
            error: (self.status == JobStatus::Failed || self.status == JobStatus::Stuck)
                .then_some(self.error)
                .flatten(),
            progress: if terminal { None } else { self.progress },
            attempts: self.attempts,
            created_at: Some(Timestamp::from(self.created_at)),
            completed_at: self.completed_at.filter(|_| terminal).map(Timestamp::from),
        }
    }
}
