//! Downstream queues for follow-up work

use crate::constants::queues;
use crate::error::WorkerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queue '{queue}' unavailable: {message}")]
    Unavailable { queue: String, message: String },

    #[error("Enqueue to '{queue}' rejected: {message}")]
    Rejected { queue: String, message: String },
}

impl From<QueueError> for WorkerError {
    fn from(error: QueueError) -> Self {
        match &error {
            QueueError::Unavailable { queue, .. } => WorkerError::service_unhealthy(
                error.to_string(),
                serde_json::json!({ "queue": queue }),
            ),
            QueueError::Rejected { .. } => {
                WorkerError::execution("fan_out", "downstream enqueue rejected", error.to_string())
            }
        }
    }
}

/// Follow-up processing stages fed by a completed note import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownstreamQueue {
    IngredientParsing,
    InstructionParsing,
    ImageProcessing,
    Categorization,
}

impl DownstreamQueue {
    pub const ALL: [DownstreamQueue; 4] = [
        DownstreamQueue::IngredientParsing,
        DownstreamQueue::InstructionParsing,
        DownstreamQueue::ImageProcessing,
        DownstreamQueue::Categorization,
    ];

    pub fn queue_name(&self) -> &'static str {
        match self {
            DownstreamQueue::IngredientParsing => queues::INGREDIENT_PROCESSING,
            DownstreamQueue::InstructionParsing => queues::INSTRUCTION_PROCESSING,
            DownstreamQueue::ImageProcessing => queues::IMAGE_PROCESSING,
            DownstreamQueue::Categorization => queues::CATEGORIZATION,
        }
    }
}

impl fmt::Display for DownstreamQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.queue_name())
    }
}

/// A job to place on a downstream queue; lower priority runs first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FollowUpJob {
    pub queue: DownstreamQueue,
    pub priority: u8,
    pub payload: Value,
}

/// Producer side of the external job queue
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job and return the identifier the queue assigned
    async fn enqueue(&self, job: FollowUpJob) -> Result<String, QueueError>;
}
