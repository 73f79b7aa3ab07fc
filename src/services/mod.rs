//! # External Collaborators
//!
//! Interfaces to the pieces of the import system that live outside this
//! crate: the HTML-to-recipe parser and the relational store. The worker only
//! calls them; it never defines their schema.

use crate::events::StatusEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Structured recipe produced by the parser
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedNote {
    pub title: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
}

impl ParsedNote {
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.ingredients.is_empty() && self.instructions.is_empty()
    }
}

/// HTML-to-recipe grammar
#[async_trait]
pub trait NoteParser: Send + Sync {
    async fn parse(&self, html: &str) -> anyhow::Result<ParsedNote>;
}

/// Persistence for parsed notes
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Store the note for an import and return its identifier
    async fn save_note(&self, import_id: &str, note: &ParsedNote) -> anyhow::Result<String>;
}

/// Persistence for status history
#[async_trait]
pub trait StatusRepository: Send + Sync {
    async fn record_status(&self, event: &StatusEvent) -> anyhow::Result<()>;
}
