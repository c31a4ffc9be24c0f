use std::{fmt, str::FromStr, time::SystemTime};
use uuid::Uuid;

/// State of a job from the point of view of the queue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Delayed => "delayed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s {
            "waiting" => Self::Waiting,
            "delayed" => Self::Delayed,
            "active" => Self::Active,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            other => return Err(crate::Error::MalformedJob(format!("unknown state {other:?}"))),
        };

        Ok(state)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub state: JobState,
    pub attempts_made: u32,
    pub progress: u8,
    pub output: Option<serde_json::Value>,
    /// Reason of the last failed attempt
    pub failed_reason: Option<String>,
    pub created_at: SystemTime,
    pub processed_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
}
