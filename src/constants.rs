//! # System Constants
//!
//! Status values, queue names and wire-level constants shared by the
//! dispatcher, the action pipeline and the broadcaster.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an import as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "PENDING",
            ImportStatus::Processing => "PROCESSING",
            ImportStatus::Completed => "COMPLETED",
            ImportStatus::Failed => "FAILED",
            ImportStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal statuses never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportStatus::Completed | ImportStatus::Failed | ImportStatus::Cancelled
        )
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ImportStatus::Pending),
            "PROCESSING" => Ok(ImportStatus::Processing),
            "COMPLETED" => Ok(ImportStatus::Completed),
            "FAILED" => Ok(ImportStatus::Failed),
            "CANCELLED" => Ok(ImportStatus::Cancelled),
            other => Err(format!("unknown import status: {other}")),
        }
    }
}

/// Queue names consumed and produced by the worker
pub mod queues {
    pub const NOTE_PROCESSING: &str = "note-processing";
    pub const INGREDIENT_PROCESSING: &str = "ingredient-processing";
    pub const INSTRUCTION_PROCESSING: &str = "instruction-processing";
    pub const IMAGE_PROCESSING: &str = "image-processing";
    pub const CATEGORIZATION: &str = "categorization";
}

/// WebSocket message types exchanged with browser clients
pub mod wire {
    pub const CONNECTION_ESTABLISHED: &str = "connection_established";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const STATUS_UPDATE: &str = "status_update";
    pub const STATUS_UPDATE_BATCH: &str = "status_update_batch";
}

/// WebSocket close codes used by the broadcaster
pub mod close_codes {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    /// "Try Again Later": the server is at its connection limit
    pub const TRY_AGAIN_LATER: u16 = 1013;

    pub const TOO_MANY_CONNECTIONS_REASON: &str = "Too many connections";
    pub const HEARTBEAT_TIMEOUT_REASON: &str = "Heartbeat timeout";
    pub const SHUTDOWN_REASON: &str = "Server shutting down";
    pub const PING_FAILED_REASON: &str = "Heartbeat delivery failed";
    pub const SEND_FAILED_REASON: &str = "Send failed";
    pub const REMOVED_REASON: &str = "Connection closed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&ImportStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
        assert_eq!(
            "processing".parse::<ImportStatus>().unwrap(),
            ImportStatus::Processing
        );
        assert!("done".parse::<ImportStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ImportStatus::Failed.is_terminal());
        assert!(!ImportStatus::Processing.is_terminal());
    }
}
