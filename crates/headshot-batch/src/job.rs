use chrono::{DateTime, Utc};
use headshot_common::{HeadshotError, ResultLocator};
use serde::Serialize;

use crate::state::Progress;

pub const UNKNOWN_FAILURE: &str = "An unknown error occurred.";

/// Lifecycle of one prompt. The payload only exists for the variant it
/// belongs to, so a `Done` job always has a result and an `Error` job always
/// has a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Done { result: ResultLocator },
    Error { message: String },
}

impl JobState {
    pub fn failed(err: &HeadshotError) -> Self {
        let message = match err {
            HeadshotError::Generation(message) => message.trim().to_string(),
            other => other.to_string(),
        };
        Self::failed_with(message)
    }

    pub fn failed_with(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self::Error {
                message: UNKNOWN_FAILURE.to_string(),
            }
        } else {
            Self::Error { message }
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Self::Pending => JobStatus::Pending,
            Self::Done { .. } => JobStatus::Done,
            Self::Error { .. } => JobStatus::Error,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    pub fn result(&self) -> Option<&ResultLocator> {
        match self {
            Self::Done { result } => Some(result),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Error { message } => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Done,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub index: usize,
    #[serde(flatten)]
    pub state: JobState,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn pending(index: usize) -> Self {
        Self {
            index,
            state: JobState::Pending,
            updated_at: Utc::now(),
        }
    }
}

/// Emitted whenever a job settles. `progress` is only present for batch
/// settlements; retries run outside the batch and have no progress bar.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub generation: u64,
    pub index: usize,
    pub state: JobState,
    pub progress: Option<Progress>,
}
