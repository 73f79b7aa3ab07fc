//! # Worker Error Taxonomy
//!
//! Typed, serializable errors shared by the action pipeline, the job dispatcher
//! and the status broadcaster.
//!
//! Every variant carries the operation it happened in and, when known, the job
//! it belongs to. Variants are tagged with a `kind` field when serialized so the
//! web layer and the queue dashboard can dispatch on the discriminant instead of
//! parsing messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Operation name used before an error has been attached to a pipeline context
pub const UNKNOWN_OPERATION: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerError {
    /// Malformed input rejected before any work was attempted
    #[error("Validation error in {operation} ({action_name}): {message}")]
    Validation {
        message: String,
        operation: String,
        job_id: Option<String>,
        action_name: String,
    },

    /// A step failed on valid input; wraps the original cause
    #[error("Execution error in {operation} ({action_name}): {message}")]
    Execution {
        message: String,
        operation: String,
        job_id: Option<String>,
        action_name: String,
        original_error: String,
    },

    /// A required collaborator was never supplied
    #[error("Missing dependency '{dependency_name}' in {operation}: {message}")]
    MissingDependency {
        message: String,
        operation: String,
        job_id: Option<String>,
        dependency_name: String,
    },

    /// An external dependency reported itself unhealthy
    #[error("Service unhealthy during {operation}: {message}")]
    ServiceUnhealthy {
        message: String,
        operation: String,
        job_id: Option<String>,
        health_check: serde_json::Value,
    },

    /// Domain-level failure tied to a specific note
    #[error("Note processing error in {operation}: {message}")]
    NoteProcessing {
        message: String,
        operation: String,
        job_id: Option<String>,
        note_id: Option<String>,
    },

    /// Invalid or inconsistent configuration detected at startup
    #[error("Configuration error in {operation}: {message}")]
    Configuration {
        message: String,
        operation: String,
        job_id: Option<String>,
    },
}

/// Discriminant of a [`WorkerError`], used for classification and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Execution,
    MissingDependency,
    ServiceUnhealthy,
    NoteProcessing,
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Execution => "ExecutionError",
            ErrorKind::MissingDependency => "MissingDependencyError",
            ErrorKind::ServiceUnhealthy => "ServiceUnhealthyError",
            ErrorKind::NoteProcessing => "NoteProcessingError",
            ErrorKind::Configuration => "ConfigurationError",
        };
        f.write_str(name)
    }
}

impl WorkerError {
    pub fn validation(action_name: impl Into<String>, message: impl Into<String>) -> Self {
        WorkerError::Validation {
            message: message.into(),
            operation: UNKNOWN_OPERATION.to_string(),
            job_id: None,
            action_name: action_name.into(),
        }
    }

    pub fn execution(
        action_name: impl Into<String>,
        message: impl Into<String>,
        original_error: impl Into<String>,
    ) -> Self {
        WorkerError::Execution {
            message: message.into(),
            operation: UNKNOWN_OPERATION.to_string(),
            job_id: None,
            action_name: action_name.into(),
            original_error: original_error.into(),
        }
    }

    pub fn missing_dependency(dependency_name: impl Into<String>) -> Self {
        let dependency_name = dependency_name.into();
        WorkerError::MissingDependency {
            message: format!("required dependency '{dependency_name}' was not provided"),
            operation: UNKNOWN_OPERATION.to_string(),
            job_id: None,
            dependency_name,
        }
    }

    pub fn service_unhealthy(message: impl Into<String>, health_check: serde_json::Value) -> Self {
        WorkerError::ServiceUnhealthy {
            message: message.into(),
            operation: UNKNOWN_OPERATION.to_string(),
            job_id: None,
            health_check,
        }
    }

    pub fn note_processing(message: impl Into<String>, note_id: Option<String>) -> Self {
        WorkerError::NoteProcessing {
            message: message.into(),
            operation: UNKNOWN_OPERATION.to_string(),
            job_id: None,
            note_id,
        }
    }

    pub fn configuration(operation: impl Into<String>, message: impl Into<String>) -> Self {
        WorkerError::Configuration {
            message: message.into(),
            operation: operation.into(),
            job_id: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::Validation { .. } => ErrorKind::Validation,
            WorkerError::Execution { .. } => ErrorKind::Execution,
            WorkerError::MissingDependency { .. } => ErrorKind::MissingDependency,
            WorkerError::ServiceUnhealthy { .. } => ErrorKind::ServiceUnhealthy,
            WorkerError::NoteProcessing { .. } => ErrorKind::NoteProcessing,
            WorkerError::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            WorkerError::Validation { message, .. }
            | WorkerError::Execution { message, .. }
            | WorkerError::MissingDependency { message, .. }
            | WorkerError::ServiceUnhealthy { message, .. }
            | WorkerError::NoteProcessing { message, .. }
            | WorkerError::Configuration { message, .. } => message,
        }
    }

    pub fn operation(&self) -> &str {
        match self {
            WorkerError::Validation { operation, .. }
            | WorkerError::Execution { operation, .. }
            | WorkerError::MissingDependency { operation, .. }
            | WorkerError::ServiceUnhealthy { operation, .. }
            | WorkerError::NoteProcessing { operation, .. }
            | WorkerError::Configuration { operation, .. } => operation,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            WorkerError::Validation { job_id, .. }
            | WorkerError::Execution { job_id, .. }
            | WorkerError::MissingDependency { job_id, .. }
            | WorkerError::ServiceUnhealthy { job_id, .. }
            | WorkerError::NoteProcessing { job_id, .. }
            | WorkerError::Configuration { job_id, .. } => job_id.as_deref(),
        }
    }

    /// Attach operation and job context, keeping the variant-specific fields
    pub fn with_job_context(mut self, operation: &str, job_id: Option<&str>) -> Self {
        match &mut self {
            WorkerError::Validation {
                operation: op,
                job_id: id,
                ..
            }
            | WorkerError::Execution {
                operation: op,
                job_id: id,
                ..
            }
            | WorkerError::MissingDependency {
                operation: op,
                job_id: id,
                ..
            }
            | WorkerError::ServiceUnhealthy {
                operation: op,
                job_id: id,
                ..
            }
            | WorkerError::NoteProcessing {
                operation: op,
                job_id: id,
                ..
            }
            | WorkerError::Configuration {
                operation: op,
                job_id: id,
                ..
            } => {
                *op = operation.to_string();
                *id = job_id.map(str::to_string);
            }
        }
        self
    }

    /// Whether the failure is worth another attempt
    ///
    /// Malformed input, missing collaborators and bad configuration never
    /// succeed on retry; everything else is assumed transient.
    pub fn is_retryable(&self) -> bool {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::MissingDependency | ErrorKind::Configuration => {
                false
            }
            ErrorKind::Execution | ErrorKind::ServiceUnhealthy | ErrorKind::NoteProcessing => true,
        }
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(error: serde_json::Error) -> Self {
        WorkerError::execution(
            "serialization",
            "JSON serialization failed",
            error.to_string(),
        )
    }
}

pub type WorkerResult<T> = Result<T, WorkerError>;
