//! Built-in note import actions
//!
//! `clean_html` -> `parse_html` -> `save_note` -> `complete_import`. Each
//! publishes a critical PROCESSING event when it starts so the UI shows
//! progress without waiting for a batch flush.

use super::data::{ActionDependencies, NotePipelineData};
use super::registry::ActionName;
use super::traits::{Action, ActionContext};
use crate::cache::CacheSetOptions;
use crate::constants::ImportStatus;
use crate::error::{WorkerError, WorkerResult};
use crate::events::StatusEvent;
use crate::services::ParsedNote;
use async_trait::async_trait;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Cache namespace for parser output
pub const PARSED_HTML_CACHE_PREFIX: &str = "parsed_html:";

/// Block elements that never carry recipe content
const NON_CONTENT_BLOCKS: [&str; 4] = ["script", "style", "noscript", "iframe"];

fn progress_event(data: &NotePipelineData, action: ActionName, message: &str) -> StatusEvent {
    let mut event = StatusEvent::new(&data.import_id, ImportStatus::Processing)
        .with_context(action.as_str())
        .with_message(message)
        .with_indent(1)
        .critical();
    if let Some(note_id) = &data.note_id {
        event = event.with_note_id(note_id);
    }
    event
}

fn require_content(action: ActionName, data: &NotePipelineData) -> WorkerResult<()> {
    if data.content.trim().is_empty() {
        return Err(WorkerError::validation(action.as_str(), "content is empty"));
    }
    Ok(())
}

/// Strip non-content blocks and comments, collapse whitespace
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanHtmlAction;

#[async_trait]
impl Action<NotePipelineData> for CleanHtmlAction {
    fn name(&self) -> &str {
        ActionName::CleanHtml.as_str()
    }

    fn validate_input(&self, data: &NotePipelineData) -> WorkerResult<()> {
        require_content(ActionName::CleanHtml, data)
    }

    async fn execute(
        &self,
        mut data: NotePipelineData,
        deps: &ActionDependencies,
        _ctx: &ActionContext,
    ) -> anyhow::Result<NotePipelineData> {
        deps.publish_progress(progress_event(&data, ActionName::CleanHtml, "Cleaning HTML"))
            .await;

        let original_len = data.content.len();
        let cleaned = clean_html(&data.content);
        if cleaned.is_empty() {
            return Err(WorkerError::validation(
                ActionName::CleanHtml.as_str(),
                "no content left after cleaning",
            )
            .into());
        }

        debug!(
            import_id = %data.import_id,
            original_len = original_len,
            cleaned_len = cleaned.len(),
            "HTML cleaned"
        );
        data.content = cleaned;
        Ok(data)
    }
}

/// Turn cleaned HTML into a structured note, reusing cached parses
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseHtmlAction;

#[async_trait]
impl Action<NotePipelineData> for ParseHtmlAction {
    fn name(&self) -> &str {
        ActionName::ParseHtml.as_str()
    }

    fn validate_input(&self, data: &NotePipelineData) -> WorkerResult<()> {
        require_content(ActionName::ParseHtml, data)
    }

    async fn execute(
        &self,
        mut data: NotePipelineData,
        deps: &ActionDependencies,
        _ctx: &ActionContext,
    ) -> anyhow::Result<NotePipelineData> {
        let parser = deps.require_parser()?;
        deps.publish_progress(progress_event(&data, ActionName::ParseHtml, "Parsing recipe"))
            .await;

        let cache_key = format!("{PARSED_HTML_CACHE_PREFIX}{}", content_hash(&data.content));
        let cached = match &deps.cache {
            Some(cache) => cache.get_json::<ParsedNote>(&cache_key).await,
            None => None,
        };

        let (parsed, fresh) = match cached {
            Some(parsed) => {
                debug!(import_id = %data.import_id, cache_key = %cache_key, "Reusing cached parse");
                (parsed, false)
            }
            None => (parser.parse(&data.content).await?, true),
        };

        // only accepted parses are cached so a retry reaches the parser again
        if parsed.is_empty() {
            return Err(WorkerError::note_processing(
                "parser found no recipe content",
                data.note_id.clone(),
            )
            .into());
        }
        if let (true, Some(cache)) = (fresh, &deps.cache) {
            cache
                .set_json(&cache_key, &parsed, CacheSetOptions::default())
                .await;
        }

        data.parsed = Some(parsed);
        Ok(data)
    }
}

/// Persist the parsed note and record its identifier
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveNoteAction;

#[async_trait]
impl Action<NotePipelineData> for SaveNoteAction {
    fn name(&self) -> &str {
        ActionName::SaveNote.as_str()
    }

    fn validate_input(&self, data: &NotePipelineData) -> WorkerResult<()> {
        if data.parsed.is_none() {
            return Err(WorkerError::validation(
                ActionName::SaveNote.as_str(),
                "no parsed note to save",
            ));
        }
        Ok(())
    }

    async fn execute(
        &self,
        mut data: NotePipelineData,
        deps: &ActionDependencies,
        _ctx: &ActionContext,
    ) -> anyhow::Result<NotePipelineData> {
        let notes = deps.require_notes()?;
        deps.publish_progress(progress_event(&data, ActionName::SaveNote, "Saving note"))
            .await;

        let Some(parsed) = data.parsed.as_ref() else {
            return Err(WorkerError::validation(
                ActionName::SaveNote.as_str(),
                "no parsed note to save",
            )
            .into());
        };

        let note_id = notes.save_note(&data.import_id, parsed).await?;
        debug!(import_id = %data.import_id, note_id = %note_id, "Note saved");
        data.note_id = Some(note_id);
        Ok(data)
    }
}

/// Announce completion to every listener
#[derive(Debug, Clone, Copy, Default)]
pub struct CompleteImportAction;

#[async_trait]
impl Action<NotePipelineData> for CompleteImportAction {
    fn name(&self) -> &str {
        ActionName::CompleteImport.as_str()
    }

    fn validate_input(&self, data: &NotePipelineData) -> WorkerResult<()> {
        if data.note_id.is_none() {
            return Err(WorkerError::validation(
                ActionName::CompleteImport.as_str(),
                "note has not been saved",
            ));
        }
        Ok(())
    }

    async fn execute(
        &self,
        data: NotePipelineData,
        deps: &ActionDependencies,
        _ctx: &ActionContext,
    ) -> anyhow::Result<NotePipelineData> {
        let status = deps.require_status()?;

        let (ingredients, instructions) = data
            .parsed
            .as_ref()
            .map(|p| (p.ingredients.len(), p.instructions.len()))
            .unwrap_or_default();

        let mut event = StatusEvent::new(&data.import_id, ImportStatus::Completed)
            .with_context(ActionName::CompleteImport.as_str())
            .with_message("Import completed")
            .with_metadata(serde_json::json!({
                "ingredients": ingredients,
                "instructions": instructions,
            }));
        if let Some(note_id) = &data.note_id {
            event = event.with_note_id(note_id);
        }

        status.publish(event).await;
        Ok(data)
    }
}

/// Hex SHA-256 of the content, used as the parse cache key
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Remove non-content elements and comments, then collapse whitespace runs
///
/// Returns the body markup. Input is parsed as an HTML5 document, so
/// malformed end tags and unclosed blocks resolve the way a browser resolves
/// them.
pub fn clean_html(html: &str) -> String {
    let mut document = Html::parse_document(html);

    let mut unwanted: Vec<_> = document
        .tree
        .nodes()
        .filter(|node| node.value().is_comment())
        .map(|node| node.id())
        .collect();
    if let Ok(selector) = Selector::parse(&NON_CONTENT_BLOCKS.join(", ")) {
        unwanted.extend(document.select(&selector).map(|element| element.id()));
    }
    for id in unwanted {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next().map(|body| body.inner_html()));
    let markup = body.unwrap_or_else(|| document.root_element().html());
    markup.split_whitespace().collect::<Vec<_>>().join(" ")
}
