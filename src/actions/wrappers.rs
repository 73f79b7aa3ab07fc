//! Composition wrappers
//!
//! [`ErrorHandlingAction`] sits directly around a base action and guarantees
//! every failure leaves as a `WorkerError` carrying the job context.
//! [`RetryAction`] holds an inner invocable and decides whether to call it
//! again.

use super::data::ActionDependencies;
use super::retry::RetryPolicy;
use super::traits::{Action, ActionContext, Invocable};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::log_action_operation;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct ErrorHandlingAction<T: Send + 'static> {
    action: Arc<dyn Action<T>>,
}

impl<T: Send + 'static> ErrorHandlingAction<T> {
    pub fn new(action: Arc<dyn Action<T>>) -> Self {
        Self { action }
    }

    fn normalize(&self, error: anyhow::Error) -> WorkerError {
        match error.downcast::<WorkerError>() {
            Ok(worker_error) => worker_error,
            Err(other) => WorkerError::execution(
                self.action.name(),
                other.to_string(),
                format!("{other:#}"),
            ),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Invocable<T> for ErrorHandlingAction<T> {
    fn name(&self) -> &str {
        self.action.name()
    }

    async fn invoke(
        &self,
        data: T,
        deps: &ActionDependencies,
        ctx: &ActionContext,
    ) -> WorkerResult<T> {
        let name = self.action.name();

        if let Err(error) = self.action.validate_input(&data) {
            log_action_operation(name, &ctx.job_id, ctx.attempt_number, "invalid_input", None);
            return Err(error.with_job_context(&ctx.operation, Some(&ctx.job_id)));
        }

        let start = Instant::now();
        let result = self.action.execute(data, deps, ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                log_action_operation(
                    name,
                    &ctx.job_id,
                    ctx.attempt_number,
                    "completed",
                    Some(duration_ms),
                );
                Ok(output)
            }
            Err(error) => {
                log_action_operation(
                    name,
                    &ctx.job_id,
                    ctx.attempt_number,
                    "failed",
                    Some(duration_ms),
                );
                Err(self
                    .normalize(error)
                    .with_job_context(&ctx.operation, Some(&ctx.job_id)))
            }
        }
    }
}

pub struct RetryAction<I> {
    inner: I,
    policy: RetryPolicy,
}

impl<I> RetryAction<I> {
    pub fn new(inner: I, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<T, I> Invocable<T> for RetryAction<I>
where
    T: Clone + Send + Sync + 'static,
    I: Invocable<T>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(
        &self,
        data: T,
        deps: &ActionDependencies,
        ctx: &ActionContext,
    ) -> WorkerResult<T> {
        let mut attempt_ctx = ctx.clone();

        loop {
            let error = match self.inner.invoke(data.clone(), deps, &attempt_ctx).await {
                Ok(output) => return Ok(output),
                Err(error) => error,
            };

            if !error.is_retryable() {
                debug!(
                    action = self.inner.name(),
                    job_id = %attempt_ctx.job_id,
                    error_kind = %error.kind(),
                    "Non-retryable failure, not retrying"
                );
                return Err(error);
            }

            if !self.policy.should_retry(attempt_ctx.attempt_number) {
                warn!(
                    action = self.inner.name(),
                    job_id = %attempt_ctx.job_id,
                    attempts = attempt_ctx.attempt_number,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(error);
            }

            let delay = self.policy.delay_for_attempt(attempt_ctx.attempt_number);
            warn!(
                action = self.inner.name(),
                job_id = %attempt_ctx.job_id,
                attempt = attempt_ctx.attempt_number,
                backoff_ms = delay.as_millis() as u64,
                error = %error,
                "Action failed, retrying after backoff"
            );
            tokio::time::sleep(delay).await;
            attempt_ctx = attempt_ctx.next_attempt();
        }
    }
}
