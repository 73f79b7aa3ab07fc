//! Status event model

use crate::constants::ImportStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Delivery class of an event
///
/// Critical events skip batching and per-client rate limiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    #[default]
    Normal,
    Critical,
}

/// One progress record for an import
///
/// Built once by the producer and never mutated afterwards; builders consume
/// and return `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub import_id: String,
    pub note_id: Option<String>,
    pub status: ImportStatus,
    pub message: Option<String>,
    pub context: Option<String>,
    pub error_message: Option<String>,
    pub current_count: Option<u32>,
    pub total_count: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub indent_level: Option<u8>,
    pub metadata: Option<Value>,
    #[serde(default)]
    pub priority: EventPriority,
}

impl StatusEvent {
    /// New event; terminal outcomes (COMPLETED, FAILED) are critical
    pub fn new(import_id: impl Into<String>, status: ImportStatus) -> Self {
        let priority = match status {
            ImportStatus::Completed | ImportStatus::Failed => EventPriority::Critical,
            _ => EventPriority::Normal,
        };

        Self {
            import_id: import_id.into(),
            note_id: None,
            status,
            message: None,
            context: None,
            error_message: None,
            current_count: None,
            total_count: None,
            created_at: Utc::now(),
            indent_level: None,
            metadata: None,
            priority,
        }
    }

    pub fn with_note_id(mut self, note_id: impl Into<String>) -> Self {
        self.note_id = Some(note_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_error(mut self, error_message: impl Into<String>) -> Self {
        self.error_message = Some(error_message.into());
        self
    }

    pub fn with_progress(mut self, current: u32, total: u32) -> Self {
        self.current_count = Some(current);
        self.total_count = Some(total);
        self
    }

    pub fn with_indent(mut self, indent_level: u8) -> Self {
        self.indent_level = Some(indent_level);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Mark as critical regardless of status
    pub fn critical(mut self) -> Self {
        self.priority = EventPriority::Critical;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.priority == EventPriority::Critical
    }
}
