//! Action contracts

use super::data::ActionDependencies;
use crate::error::WorkerResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Read-only record handed to every action invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    pub operation: String,
    pub job_id: String,
    /// Attempt of this action within the current job attempt, starting at 1
    pub attempt_number: u32,
    /// Deliveries of the job so far, as reported by the queue
    pub job_attempt: u32,
}

impl ActionContext {
    pub fn new(operation: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            job_id: job_id.into(),
            attempt_number: 1,
            job_attempt: 1,
        }
    }

    pub fn with_job_attempt(mut self, job_attempt: u32) -> Self {
        self.job_attempt = job_attempt;
        self
    }

    /// Copy of this context for the next retry
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt_number: self.attempt_number + 1,
            ..self.clone()
        }
    }
}

/// One named processing step
///
/// Input and output share a type so actions chain. `execute` may fail with
/// anything; the error-handling wrapper turns it into a `WorkerError`. A
/// `WorkerError` returned through `anyhow` keeps its kind.
#[async_trait]
pub trait Action<T: Send + 'static>: Send + Sync {
    fn name(&self) -> &str;

    /// Reject malformed input before any work happens
    fn validate_input(&self, _data: &T) -> WorkerResult<()> {
        Ok(())
    }

    async fn execute(
        &self,
        data: T,
        deps: &ActionDependencies,
        ctx: &ActionContext,
    ) -> anyhow::Result<T>;
}

/// Anything a pipeline can call: a wrapped action or a wrapper around one
#[async_trait]
pub trait Invocable<T: Send + 'static>: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(
        &self,
        data: T,
        deps: &ActionDependencies,
        ctx: &ActionContext,
    ) -> WorkerResult<T>;
}
