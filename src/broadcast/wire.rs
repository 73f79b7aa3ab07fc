//! WebSocket wire format
//!
//! Status events go out with one- and two-letter field names and an epoch
//! millisecond timestamp to keep per-message bytes down. The mapping is
//! reversible for in-process consumers.

use crate::constants::ImportStatus;
use crate::events::StatusEvent;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedStatusEvent {
    #[serde(rename = "i")]
    pub import_id: String,
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    #[serde(rename = "s")]
    pub status: ImportStatus,
    #[serde(rename = "m", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(rename = "cc", default, skip_serializing_if = "Option::is_none")]
    pub current_count: Option<u32>,
    #[serde(rename = "tc", default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u32>,
    /// Creation time, epoch milliseconds
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "il", default, skip_serializing_if = "Option::is_none")]
    pub indent_level: Option<u8>,
    #[serde(rename = "md", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl From<&StatusEvent> for OptimizedStatusEvent {
    fn from(event: &StatusEvent) -> Self {
        Self {
            import_id: event.import_id.clone(),
            note_id: event.note_id.clone(),
            status: event.status,
            message: event.message.clone(),
            context: event.context.clone(),
            error_message: event.error_message.clone(),
            current_count: event.current_count,
            total_count: event.total_count,
            timestamp: event.created_at.timestamp_millis(),
            indent_level: event.indent_level,
            metadata: event.metadata.clone(),
        }
    }
}

impl OptimizedStatusEvent {
    /// Rebuild the full event; priority is re-derived from the status
    pub fn into_status_event(self) -> StatusEvent {
        let created_at: DateTime<Utc> = Utc
            .timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_else(Utc::now);

        StatusEvent {
            note_id: self.note_id,
            message: self.message,
            context: self.context,
            error_message: self.error_message,
            current_count: self.current_count,
            total_count: self.total_count,
            indent_level: self.indent_level,
            metadata: self.metadata,
            ..StatusEvent::new(self.import_id, self.status).with_created_at(created_at)
        }
    }
}

/// Messages sent to browsers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        #[serde(rename = "clientId")]
        client_id: String,
        message: String,
    },
    Pong {
        timestamp: i64,
    },
    StatusUpdate {
        data: OptimizedStatusEvent,
    },
    StatusUpdateBatch {
        events: Vec<OptimizedStatusEvent>,
        #[serde(rename = "batchId")]
        batch_id: u64,
        timestamp: i64,
    },
}

impl ServerMessage {
    pub fn status_update(event: &StatusEvent) -> Self {
        ServerMessage::StatusUpdate { data: event.into() }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Messages received from browsers
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping {
        #[serde(default)]
        timestamp: Option<i64>,
    },
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// `None` for frames that are not JSON objects with a `type`
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_update_uses_short_field_names() {
        let created_at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let event = StatusEvent::new("imp-1", ImportStatus::Processing)
            .with_message("Parsing recipe")
            .with_progress(2, 5)
            .with_created_at(created_at);

        let json: Value =
            serde_json::from_str(&ServerMessage::status_update(&event).to_json().unwrap()).unwrap();

        assert_eq!(
            json,
            json!({
                "type": "status_update",
                "data": {
                    "i": "imp-1",
                    "s": "PROCESSING",
                    "m": "Parsing recipe",
                    "cc": 2,
                    "tc": 5,
                    "t": 1_700_000_000_000i64
                }
            })
        );
    }

    #[test]
    fn test_inverse_mapping_restores_full_event() {
        let event = StatusEvent::new("imp-1", ImportStatus::Failed)
            .with_note_id("n-1")
            .with_error("parser crashed")
            .with_metadata(json!({"attempts": 3}));

        let restored = OptimizedStatusEvent::from(&event).into_status_event();

        assert_eq!(restored.import_id, "imp-1");
        assert_eq!(restored.note_id.as_deref(), Some("n-1"));
        assert_eq!(restored.error_message.as_deref(), Some("parser crashed"));
        assert_eq!(
            restored.created_at.timestamp_millis(),
            event.created_at.timestamp_millis()
        );
        assert!(restored.is_critical());
    }

    #[test]
    fn test_batch_envelope_shape() {
        let message = ServerMessage::StatusUpdateBatch {
            events: vec![],
            batch_id: 7,
            timestamp: 1,
        };
        let json: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "status_update_batch");
        assert_eq!(json["batchId"], 7);
    }

    #[test]
    fn test_client_message_parsing() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"ping","timestamp":5}"#),
            Some(ClientMessage::Ping { timestamp: Some(5) })
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"subscribe"}"#),
            Some(ClientMessage::Unknown)
        );
        assert_eq!(ClientMessage::parse("not json"), None);
    }
}
