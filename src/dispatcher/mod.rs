//! # Job Dispatcher
//!
//! Entry point for jobs delivered by the external queue: validation, health
//! gate, pipeline execution, best-effort fan-out and failure classification.

pub mod error_classifier;
pub mod health;
pub mod job;
pub mod processor;
pub mod queue;

pub use error_classifier::{
    ErrorCategory, ErrorClassification, ErrorClassifier, ErrorContext, StandardErrorClassifier,
};
pub use health::{
    CacheHealthCheck, CheckStatus, CompositeHealthMonitor, HealthCheck, HealthMonitor,
    ServiceHealth,
};
pub use job::{
    EnqueuedJob, FanOutFailure, FanOutReport, Job, JobFailure, JobOutcome, JobState,
    NoteJobPayload,
};
pub use processor::{
    fan_out_targets, JobHandler, NoteJobDispatcher, NoteJobDispatcherBuilder,
    NOTE_IMPORT_OPERATION,
};
pub use queue::{DownstreamQueue, FollowUpJob, JobQueue, QueueError};
