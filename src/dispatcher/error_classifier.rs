//! # Job Error Classification
//!
//! Turns a [`WorkerError`] plus the delivery context into a retry decision.
//! The dispatcher never inspects error kinds itself; it asks a classifier.
//!
//! ```text
//! WorkerError + ErrorContext ──▶ ErrorClassifier ──▶ ErrorClassification
//!                                                     (category, retry_delay,
//!                                                      is_final_attempt)
//! ```

use crate::actions::RetryPolicy;
use crate::error::{ErrorKind, WorkerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Delivery context used for classification
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub job_id: String,
    pub queue_name: String,
    /// Current delivery, 1-based
    pub attempt_number: u32,
    /// Deliveries the queue grants before giving up
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    /// Whether the job should be delivered again
    pub is_retryable: bool,
    /// Delay before redelivery; set only when retryable
    pub retry_delay: Option<Duration>,
    pub error_code: String,
    pub error_message: String,
    pub is_final_attempt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Will never succeed if retried
    Permanent,
    /// May succeed on retry
    Transient,
    /// A collaborator is down; retry when it recovers
    DependencyFailure,
    /// Requires manual intervention
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Permanent => write!(f, "Permanent"),
            ErrorCategory::Transient => write!(f, "Transient"),
            ErrorCategory::DependencyFailure => write!(f, "Dependency Failure"),
            ErrorCategory::Configuration => write!(f, "Configuration"),
        }
    }
}

pub trait ErrorClassifier: Send + Sync {
    fn classify_error(&self, error: &WorkerError, context: &ErrorContext) -> ErrorClassification;

    fn classifier_name(&self) -> &'static str;
}

/// Classifies by error kind and backs off with the job retry policy
#[derive(Debug, Clone, Default)]
pub struct StandardErrorClassifier {
    retry_policy: RetryPolicy,
}

impl StandardErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_policy(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    fn category_for(kind: ErrorKind) -> (ErrorCategory, &'static str) {
        match kind {
            ErrorKind::Validation => (ErrorCategory::Permanent, "VALIDATION_ERROR"),
            ErrorKind::Execution => (ErrorCategory::Transient, "EXECUTION_ERROR"),
            ErrorKind::NoteProcessing => (ErrorCategory::Transient, "NOTE_PROCESSING_ERROR"),
            ErrorKind::ServiceUnhealthy => (ErrorCategory::DependencyFailure, "SERVICE_UNHEALTHY"),
            ErrorKind::MissingDependency => (ErrorCategory::Configuration, "MISSING_DEPENDENCY"),
            ErrorKind::Configuration => (ErrorCategory::Configuration, "CONFIGURATION_ERROR"),
        }
    }
}

impl ErrorClassifier for StandardErrorClassifier {
    fn classify_error(&self, error: &WorkerError, context: &ErrorContext) -> ErrorClassification {
        let (category, error_code) = Self::category_for(error.kind());
        let is_final_attempt = context.attempt_number >= context.max_attempts;
        let is_retryable = error.is_retryable() && !is_final_attempt;

        let retry_delay =
            is_retryable.then(|| self.retry_policy.delay_for_attempt(context.attempt_number));

        ErrorClassification {
            category,
            is_retryable,
            retry_delay,
            error_code: error_code.to_string(),
            error_message: error.to_string(),
            is_final_attempt,
        }
    }

    fn classifier_name(&self) -> &'static str {
        "StandardErrorClassifier"
    }
}
