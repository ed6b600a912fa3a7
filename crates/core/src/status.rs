//! Job status model pushed by the status stream.
//!
//! A [`JobStatusEvent`] is one snapshot of a job's progress. Events move
//! through `queued -> started -> in_progress -> {completed | failed}`, but
//! the source does not enforce that order and the client does not either:
//! the latest event received is the current state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Message used when a `failed` event carries no error text.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Job failed";

/// Lower and upper bound of the `progress` percentage.
const PROGRESS_MIN: f64 = 0.0;
const PROGRESS_MAX: f64 = 100.0;

/// Lifecycle status of a backend job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Started,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Started,
        JobStatus::InProgress,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Look up a status by its wire name. Matching is exact.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// `completed` and `failed` end the job; nothing is expected after them.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Position in the natural lifecycle. Both terminal states share the
    /// highest rank.
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Started => 1,
            JobStatus::InProgress => 2,
            JobStatus::Completed | JobStatus::Failed => 3,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot of a job's progress at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusEvent {
    pub status: JobStatus,

    /// Completion percentage in `[0, 100]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,

    /// Opaque job output. Only kept on `completed` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Failure description. Only kept on `failed` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatusEvent {
    /// An event carrying only a status.
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            progress: None,
            result: None,
            error: None,
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Enforce the field constraints on a decoded event.
    ///
    /// Progress is clamped into `[0, 100]` and dropped when not finite.
    /// `result` is kept only on `completed`, `error` only on `failed`.
    pub fn normalized(mut self) -> Self {
        self.progress = self
            .progress
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(PROGRESS_MIN, PROGRESS_MAX));
        if self.status != JobStatus::Completed {
            self.result = None;
        }
        if self.status != JobStatus::Failed {
            self.error = None;
        }
        self
    }

    /// Error text reported to the failure callback.
    pub fn failure_message(&self) -> &str {
        self.error
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or(DEFAULT_FAILURE_MESSAGE)
    }
}
