//! Pipeline payload and injected collaborators

use crate::cache::ResultCache;
use crate::error::{WorkerError, WorkerResult};
use crate::events::{StatusEvent, StatusPublisher};
use crate::services::{NoteParser, NoteRepository, ParsedNote};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// Payload threaded through the note import pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePipelineData {
    pub import_id: String,
    /// Raw HTML, replaced by the cleaned markup after `clean_html`
    pub content: String,
    pub source_name: Option<String>,
    /// Set by `parse_html`
    pub parsed: Option<ParsedNote>,
    /// Set by `save_note`
    pub note_id: Option<String>,
}

impl NotePipelineData {
    pub fn new(import_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            import_id: import_id.into(),
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Collaborators available to actions
///
/// Every field is optional so tests can supply only what they exercise; an
/// action that needs a missing collaborator fails with `MissingDependency`.
#[derive(Clone, Default)]
pub struct ActionDependencies {
    pub cache: Option<Arc<ResultCache>>,
    pub status: Option<Arc<dyn StatusPublisher>>,
    pub parser: Option<Arc<dyn NoteParser>>,
    pub notes: Option<Arc<dyn NoteRepository>>,
}

impl std::fmt::Debug for ActionDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDependencies")
            .field("cache", &self.cache.is_some())
            .field("status", &self.status.is_some())
            .field("parser", &self.parser.is_some())
            .field("notes", &self.notes.is_some())
            .finish()
    }
}

impl ActionDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_status(mut self, status: Arc<dyn StatusPublisher>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn NoteParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_notes(mut self, notes: Arc<dyn NoteRepository>) -> Self {
        self.notes = Some(notes);
        self
    }

    pub fn require_parser(&self) -> WorkerResult<&Arc<dyn NoteParser>> {
        self.parser
            .as_ref()
            .ok_or_else(|| WorkerError::missing_dependency("parser"))
    }

    pub fn require_notes(&self) -> WorkerResult<&Arc<dyn NoteRepository>> {
        self.notes
            .as_ref()
            .ok_or_else(|| WorkerError::missing_dependency("notes"))
    }

    pub fn require_status(&self) -> WorkerResult<&Arc<dyn StatusPublisher>> {
        self.status
            .as_ref()
            .ok_or_else(|| WorkerError::missing_dependency("status"))
    }

    /// Publish a progress event if a publisher is wired; otherwise skip
    pub async fn publish_progress(&self, event: StatusEvent) {
        match &self.status {
            Some(status) => status.publish(event).await,
            None => trace!(import_id = %event.import_id, "No status publisher, progress dropped"),
        }
    }
}
