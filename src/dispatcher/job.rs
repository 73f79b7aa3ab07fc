//! Job records and outcomes

use super::error_classifier::ErrorClassification;
use super::queue::DownstreamQueue;
use crate::actions::PipelineReport;
use crate::error::WorkerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// One delivery of a job from the external queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub queue_name: String,
    pub payload: Value,
    /// Deliveries that already failed; zero on the first delivery
    #[serde(default)]
    pub attempts_made: u32,
}

impl Job {
    pub fn new(id: impl Into<String>, queue_name: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            queue_name: queue_name.into(),
            payload,
            attempts_made: 0,
        }
    }

    pub fn with_attempts_made(mut self, attempts_made: u32) -> Self {
        self.attempts_made = attempts_made;
        self
    }

    /// 1-based number of the delivery being processed
    pub fn attempt(&self) -> u32 {
        self.attempts_made.saturating_add(1)
    }
}

/// Payload of a note import job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteJobPayload {
    pub import_id: String,
    pub content: String,
    #[serde(default)]
    pub source_name: Option<String>,
}

/// Where a job attempt is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Received,
    Validated,
    HealthChecked,
    Executing,
    Succeeded,
    RetryScheduled,
    FailedTerminal,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Received => "received",
            JobState::Validated => "validated",
            JobState::HealthChecked => "health_checked",
            JobState::Executing => "executing",
            JobState::Succeeded => "succeeded",
            JobState::RetryScheduled => "retry_scheduled",
            JobState::FailedTerminal => "failed_terminal",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::RetryScheduled | JobState::FailedTerminal
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnqueuedJob {
    pub queue: DownstreamQueue,
    pub job_id: String,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FanOutFailure {
    pub queue: DownstreamQueue,
    pub error: String,
    pub error_code: String,
}

/// Follow-up jobs created after a successful pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FanOutReport {
    pub enqueued: Vec<EnqueuedJob>,
    pub failed: Vec<FanOutFailure>,
}

impl FanOutReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub import_id: String,
    pub note_id: Option<String>,
    pub fan_out: FanOutReport,
    pub pipeline: PipelineReport,
}

/// A failed job attempt
///
/// `retry_after` is set when the queue should deliver the job again after
/// that delay; `None` means the failure is terminal.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct JobFailure {
    #[source]
    pub error: WorkerError,
    pub classification: ErrorClassification,
    pub retry_after: Option<Duration>,
}

impl JobFailure {
    pub fn is_terminal(&self) -> bool {
        self.retry_after.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_deserializes_with_default_attempts() {
        let job: Job = serde_json::from_value(json!({
            "id": "job-1",
            "queue_name": "note-processing",
            "payload": {"importId": "imp-1", "content": "<p>x</p>"}
        }))
        .unwrap();

        assert_eq!(job.attempts_made, 0);
        assert_eq!(job.attempt(), 1);

        let payload: NoteJobPayload = serde_json::from_value(job.payload).unwrap();
        assert_eq!(payload.import_id, "imp-1");
        assert!(payload.source_name.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::FailedTerminal.is_terminal());
        assert!(!JobState::Executing.is_terminal());
    }
}
