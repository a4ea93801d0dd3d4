use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::models::extraction::ExtractionResult;

/// Opaque, globally unique identifier assigned at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Per-job pipeline options chosen by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    pub perform_recognition: bool,
}

/// Job metadata as it travels through the queue and sits in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub options: JobOptions,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(options: JobOptions, ttl: std::time::Duration) -> Self {
        let created_at = Utc::now();
        let ttl = Duration::from_std(ttl).unwrap_or(Duration::MAX);
        Self {
            job_id: JobId::new(),
            options,
            created_at,
            expires_at: created_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Time left before the store purges this job, `None` once the deadline has passed.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        (self.expires_at - now).to_std().ok().filter(|d| !d.is_zero())
    }
}

/// A job handed to exactly one worker.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job_id: JobId,
    pub input: Vec<u8>,
    pub options: JobOptions,
}

/// Failure payload of a terminal job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorResult {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// What a worker records when it finishes a job. Written once, never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Success(ExtractionResult),
    Failure(ErrorResult),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Current state of a job as seen by the store.
///
/// Payloads exist only on the terminal variants.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Pending,
    Success(ExtractionResult),
    Failure(ErrorResult),
    /// Never issued, or already purged.
    Unknown,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Failure(_))
    }
}

impl From<JobOutcome> for JobState {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Success(result) => Self::Success(result),
            JobOutcome::Failure(error) => Self::Failure(error),
        }
    }
}

/// Result of a `complete` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// First writer; the outcome is now the job's terminal state.
    Recorded,
    /// A terminal state already existed; nothing was written.
    AlreadyTerminal,
    /// The job's deadline passed before completion; nothing was written.
    Expired,
}

impl Completion {
    /// Error kind explaining why nothing was written, `None` when recorded.
    pub fn rejection(&self) -> Option<ErrorKind> {
        match self {
            Self::Recorded => None,
            Self::AlreadyTerminal => Some(ErrorKind::AlreadyTerminal),
            Self::Expired => Some(ErrorKind::Unknown),
        }
    }
}
