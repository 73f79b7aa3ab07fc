//! Ordered action chains

use super::data::ActionDependencies;
use super::retry::RetryPolicy;
use super::traits::{Action, ActionContext, Invocable};
use super::wrappers::{ErrorHandlingAction, RetryAction};
use crate::error::WorkerResult;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub action: String,
    pub duration: Duration,
}

/// Per-step timing of a successful run
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub steps: Vec<StepReport>,
    pub total_duration: Duration,
}

/// Actions executed strictly in order, each output feeding the next step
pub struct Pipeline<T: Send + 'static> {
    steps: Vec<Box<dyn Invocable<T>>>,
}

impl<T: Send + 'static> Default for Pipeline<T> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<T: Send + 'static> Pipeline<T> {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }
}

impl<T: Send + 'static> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.step_names())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Pipeline<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an already composed step
    pub fn then(mut self, step: Box<dyn Invocable<T>>) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a base action wrapped as retry(error-handling(action))
    pub fn then_action(self, action: Arc<dyn Action<T>>, policy: RetryPolicy) -> Self {
        self.then(Box::new(RetryAction::new(
            ErrorHandlingAction::new(action),
            policy,
        )))
    }

    pub async fn run(
        &self,
        data: T,
        deps: &ActionDependencies,
        ctx: &ActionContext,
    ) -> WorkerResult<T> {
        self.run_with_report(data, deps, ctx)
            .await
            .map(|(output, _)| output)
    }

    /// Run every step; the first failure stops the chain
    pub async fn run_with_report(
        &self,
        data: T,
        deps: &ActionDependencies,
        ctx: &ActionContext,
    ) -> WorkerResult<(T, PipelineReport)> {
        let started = Instant::now();
        let mut report = PipelineReport::default();
        let mut current = data;

        for step in &self.steps {
            let step_started = Instant::now();
            current = step.invoke(current, deps, ctx).await?;
            report.steps.push(StepReport {
                action: step.name().to_string(),
                duration: step_started.elapsed(),
            });
        }

        report.total_duration = started.elapsed();
        debug!(
            job_id = %ctx.job_id,
            steps = report.steps.len(),
            total_ms = report.total_duration.as_millis() as u64,
            "Pipeline completed"
        );
        Ok((current, report))
    }
}
