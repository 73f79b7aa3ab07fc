//! # Note Job Processor
//!
//! Drives one delivery of a note import job through
//! `Received → Validated → HealthChecked → Executing → {Succeeded | RetryScheduled | FailedTerminal}`.
//!
//! Retries of a whole job are the external queue's business: a retryable
//! failure comes back as a [`JobFailure`] with `retry_after` set and the
//! queue redelivers after that delay. Per-action retries happen inside the
//! pipeline.

use super::error_classifier::{ErrorClassifier, ErrorContext, StandardErrorClassifier};
use super::health::{CompositeHealthMonitor, HealthMonitor};
use super::job::{
    EnqueuedJob, FanOutFailure, FanOutReport, Job, JobFailure, JobOutcome, JobState,
    NoteJobPayload,
};
use super::queue::{DownstreamQueue, FollowUpJob, JobQueue};
use crate::actions::{
    ActionContext, ActionDependencies, ActionRegistry, NotePipelineData, Pipeline, RetryPolicy,
};
use crate::config::{DispatcherConfig, FanOutConfig};
use crate::constants::ImportStatus;
use crate::error::{WorkerError, WorkerResult};
use crate::events::StatusEvent;
use crate::logging::{log_error, log_job_operation};
use crate::services::ParsedNote;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Operation name attached to every error raised while importing a note
pub const NOTE_IMPORT_OPERATION: &str = "note_import";

/// Consumer side of the external job queue
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn queue_name(&self) -> &str;

    async fn handle(&self, job: &Job) -> Result<JobOutcome, JobFailure>;
}

pub struct NoteJobDispatcher {
    config: DispatcherConfig,
    pipeline: Pipeline<NotePipelineData>,
    deps: ActionDependencies,
    health: Arc<dyn HealthMonitor>,
    downstream: Option<Arc<dyn JobQueue>>,
    classifier: Arc<dyn ErrorClassifier>,
}

impl std::fmt::Debug for NoteJobDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteJobDispatcher")
            .field("queue_name", &self.config.queue_name)
            .field("pipeline", &self.pipeline)
            .field("deps", &self.deps)
            .field("downstream", &self.downstream.is_some())
            .field("classifier", &self.classifier.classifier_name())
            .finish()
    }
}

impl NoteJobDispatcher {
    pub fn builder() -> NoteJobDispatcherBuilder {
        NoteJobDispatcherBuilder::default()
    }

    pub fn pipeline(&self) -> &Pipeline<NotePipelineData> {
        &self.pipeline
    }

    /// Process one delivery of a job
    pub async fn process(&self, job: &Job) -> Result<JobOutcome, JobFailure> {
        let queue_name = self.config.queue_name.as_str();
        let attempt = job.attempt();
        self.transition(job, JobState::Received, None);

        let payload = match Self::parse_payload(job) {
            Ok(payload) => payload,
            Err(e) => return Err(self.fail(job, None, e).await),
        };
        if let Err(e) = Self::validate(&payload) {
            let import_id =
                (!payload.import_id.trim().is_empty()).then_some(payload.import_id.as_str());
            return Err(self.fail(job, import_id, e).await);
        }
        self.transition(job, JobState::Validated, None);

        if let Err(e) = self.check_health().await {
            return Err(self.fail(job, Some(&payload.import_id), e).await);
        }
        self.transition(job, JobState::HealthChecked, None);

        let ctx = ActionContext::new(NOTE_IMPORT_OPERATION, &job.id).with_job_attempt(attempt);
        let data = NotePipelineData {
            source_name: payload.source_name.clone(),
            ..NotePipelineData::new(&payload.import_id, &payload.content)
        };

        self.transition(job, JobState::Executing, None);
        let (output, report) = match self.pipeline.run_with_report(data, &self.deps, &ctx).await {
            Ok(result) => result,
            Err(e) => return Err(self.fail(job, Some(&payload.import_id), e).await),
        };

        let fan_out = match &output.parsed {
            Some(parsed) => self.fan_out(job, &output, parsed).await,
            None => FanOutReport::default(),
        };

        info!(
            job_id = %job.id,
            queue_name = %queue_name,
            import_id = %output.import_id,
            note_id = ?output.note_id,
            enqueued = fan_out.enqueued.len(),
            fan_out_failures = fan_out.failed.len(),
            duration_ms = report.total_duration.as_millis() as u64,
            "Note job succeeded"
        );
        self.transition(job, JobState::Succeeded, None);

        Ok(JobOutcome {
            import_id: output.import_id,
            note_id: output.note_id,
            fan_out,
            pipeline: report,
        })
    }

    fn parse_payload(job: &Job) -> WorkerResult<NoteJobPayload> {
        serde_json::from_value(job.payload.clone())
            .map_err(|e| WorkerError::validation("validate_job", format!("malformed payload: {e}")))
    }

    fn validate(payload: &NoteJobPayload) -> WorkerResult<()> {
        if payload.import_id.trim().is_empty() {
            return Err(WorkerError::validation("validate_job", "importId is empty"));
        }
        if payload.content.trim().is_empty() {
            return Err(WorkerError::validation("validate_job", "content is empty"));
        }
        Ok(())
    }

    async fn check_health(&self) -> WorkerResult<()> {
        let health = self.health.check_health().await;
        if health.healthy {
            return Ok(());
        }

        let failing = health.failing_checks().join(", ");
        let report = serde_json::to_value(&health).unwrap_or_default();
        Err(WorkerError::service_unhealthy(
            format!("unhealthy dependencies: {failing}"),
            report,
        ))
    }

    /// Enqueue follow-up work; a failing queue never affects the others
    async fn fan_out(
        &self,
        job: &Job,
        output: &NotePipelineData,
        parsed: &ParsedNote,
    ) -> FanOutReport {
        let mut report = FanOutReport::default();
        let Some(queue) = &self.downstream else {
            return report;
        };

        for (target, priority) in fan_out_targets(&self.config.fan_out, parsed) {
            let follow_up = FollowUpJob {
                queue: target,
                priority,
                payload: json!({
                    "importId": output.import_id,
                    "noteId": output.note_id,
                    "parentJobId": job.id,
                }),
            };

            match queue.enqueue(follow_up).await {
                Ok(job_id) => {
                    debug!(
                        job_id = %job.id,
                        downstream_queue = %target,
                        downstream_job_id = %job_id,
                        priority = priority,
                        "Follow-up job enqueued"
                    );
                    report.enqueued.push(EnqueuedJob {
                        queue: target,
                        job_id,
                        priority,
                    });
                }
                Err(e) => {
                    let error = WorkerError::from(e)
                        .with_job_context(NOTE_IMPORT_OPERATION, Some(&job.id));
                    let classification = self
                        .classifier
                        .classify_error(&error, &self.error_context(job));
                    warn!(
                        job_id = %job.id,
                        downstream_queue = %target,
                        error_code = %classification.error_code,
                        category = %classification.category,
                        error = %error,
                        "Fan-out enqueue failed"
                    );
                    report.failed.push(FanOutFailure {
                        queue: target,
                        error: error.to_string(),
                        error_code: classification.error_code,
                    });
                }
            }
        }
        report
    }

    fn error_context(&self, job: &Job) -> ErrorContext {
        ErrorContext {
            job_id: job.id.clone(),
            queue_name: self.config.queue_name.clone(),
            attempt_number: job.attempt(),
            max_attempts: self.config.max_job_attempts,
        }
    }

    /// Classify a failure, log it and, when terminal, record it as FAILED
    async fn fail(&self, job: &Job, import_id: Option<&str>, error: WorkerError) -> JobFailure {
        let error = error.with_job_context(NOTE_IMPORT_OPERATION, Some(&job.id));
        let classification = self
            .classifier
            .classify_error(&error, &self.error_context(job));

        if classification.is_retryable {
            let retry_after = classification.retry_delay;
            warn!(
                job_id = %job.id,
                queue_name = %self.config.queue_name,
                retry_count = job.attempts_made,
                error_kind = %error.kind(),
                error_code = %classification.error_code,
                backoff_ms = retry_after.map(|d| d.as_millis() as u64),
                error = %error,
                "Job attempt failed, retry scheduled"
            );
            self.transition(job, JobState::RetryScheduled, Some(&classification.error_code));
            return JobFailure {
                error,
                classification,
                retry_after,
            };
        }

        error!(
            job_id = %job.id,
            queue_name = %self.config.queue_name,
            retry_count = job.attempts_made,
            error_kind = %error.kind(),
            error_code = %classification.error_code,
            category = %classification.category,
            final_attempt = classification.is_final_attempt,
            error = %error,
            "Job failed terminally"
        );
        log_error(
            "dispatcher",
            NOTE_IMPORT_OPERATION,
            &error.to_string(),
            Some(&job.id),
        );
        self.transition(job, JobState::FailedTerminal, Some(&classification.error_code));

        match (import_id, &self.deps.status) {
            (Some(import_id), Some(status)) => {
                let event = StatusEvent::new(import_id, ImportStatus::Failed)
                    .with_context(NOTE_IMPORT_OPERATION)
                    .with_message("Import failed")
                    .with_error(error.message())
                    .with_metadata(json!({
                        "errorCode": classification.error_code,
                        "attempts": job.attempt(),
                    }));
                status.publish(event).await;
            }
            (None, _) => {
                debug!(job_id = %job.id, "No import id on failed job, skipping status event");
            }
            (Some(_), None) => {}
        }

        JobFailure {
            error,
            classification,
            retry_after: None,
        }
    }

    fn transition(&self, job: &Job, state: JobState, details: Option<&str>) {
        log_job_operation(
            "transition",
            &job.id,
            &self.config.queue_name,
            job.attempt(),
            state.as_str(),
            details,
        );
    }
}

#[async_trait]
impl JobHandler for NoteJobDispatcher {
    fn queue_name(&self) -> &str {
        &self.config.queue_name
    }

    async fn handle(&self, job: &Job) -> Result<JobOutcome, JobFailure> {
        self.process(job).await
    }
}

/// Downstream queues a parsed note feeds, with their priorities
pub fn fan_out_targets(config: &FanOutConfig, parsed: &ParsedNote) -> Vec<(DownstreamQueue, u8)> {
    if !config.enabled {
        return Vec::new();
    }

    let mut targets = Vec::with_capacity(DownstreamQueue::ALL.len());
    if !parsed.ingredients.is_empty() {
        targets.push((DownstreamQueue::IngredientParsing, config.ingredient_priority));
    }
    if !parsed.instructions.is_empty() {
        targets.push((DownstreamQueue::InstructionParsing, config.instruction_priority));
    }
    if !parsed.images.is_empty() {
        targets.push((DownstreamQueue::ImageProcessing, config.image_priority));
    }
    targets.push((DownstreamQueue::Categorization, config.categorization_priority));
    targets
}

/// Assembles a [`NoteJobDispatcher`]
///
/// Only the pipeline collaborators are required in practice; health defaults
/// to an empty (always healthy) monitor and fan-out is skipped without a
/// downstream queue.
#[derive(Default)]
pub struct NoteJobDispatcherBuilder {
    config: DispatcherConfig,
    retry_policy: RetryPolicy,
    registry: Option<ActionRegistry<NotePipelineData>>,
    deps: ActionDependencies,
    health: Option<Arc<dyn HealthMonitor>>,
    downstream: Option<Arc<dyn JobQueue>>,
    classifier: Option<Arc<dyn ErrorClassifier>>,
}

impl NoteJobDispatcherBuilder {
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn registry(mut self, registry: ActionRegistry<NotePipelineData>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn dependencies(mut self, deps: ActionDependencies) -> Self {
        self.deps = deps;
        self
    }

    pub fn health_monitor(mut self, health: Arc<dyn HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn downstream_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.downstream = Some(queue);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Resolve the configured pipeline; an unregistered action is an error
    pub fn build(self) -> WorkerResult<NoteJobDispatcher> {
        let registry = self.registry.unwrap_or_else(ActionRegistry::with_defaults);
        let pipeline = registry
            .build_pipeline(&self.config.pipeline, &self.retry_policy)
            .map_err(|e| e.with_job_context("build_dispatcher", None))?;

        let classifier = self.classifier.unwrap_or_else(|| {
            Arc::new(StandardErrorClassifier::with_retry_policy(
                self.retry_policy.clone(),
            ))
        });

        info!(
            queue_name = %self.config.queue_name,
            steps = ?pipeline.step_names(),
            max_job_attempts = self.config.max_job_attempts,
            classifier = classifier.classifier_name(),
            "Note job dispatcher built"
        );

        Ok(NoteJobDispatcher {
            config: self.config,
            pipeline,
            deps: self.deps,
            health: self
                .health
                .unwrap_or_else(|| Arc::new(CompositeHealthMonitor::new())),
            downstream: self.downstream,
            classifier,
        })
    }
}
