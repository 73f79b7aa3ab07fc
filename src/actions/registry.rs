//! Action registry keyed by a closed set of names
//!
//! Pipelines are described by [`ActionName`] lists in configuration. Names are
//! parsed at load time and every name is resolved against the registry when
//! the pipeline is built, so an unknown or unregistered action is a startup
//! error rather than a failure on the first job.

use super::data::NotePipelineData;
use super::note_actions::{CleanHtmlAction, CompleteImportAction, ParseHtmlAction, SaveNoteAction};
use super::pipeline::Pipeline;
use super::retry::RetryPolicy;
use super::traits::Action;
use crate::error::{WorkerError, WorkerResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionName {
    CleanHtml,
    ParseHtml,
    SaveNote,
    CompleteImport,
}

impl ActionName {
    pub const ALL: [ActionName; 4] = [
        ActionName::CleanHtml,
        ActionName::ParseHtml,
        ActionName::SaveNote,
        ActionName::CompleteImport,
    ];

    /// The note import chain, in execution order
    pub fn default_pipeline() -> &'static [ActionName] {
        &Self::ALL
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionName::CleanHtml => "clean_html",
            ActionName::ParseHtml => "parse_html",
            ActionName::SaveNote => "save_note",
            ActionName::CompleteImport => "complete_import",
        }
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionName {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| {
                WorkerError::configuration("action_registry", format!("unknown action name '{s}'"))
            })
    }
}

pub type ActionFactory<T> = Arc<dyn Fn() -> Arc<dyn Action<T>> + Send + Sync>;

pub struct ActionRegistry<T: Send + 'static> {
    factories: HashMap<ActionName, ActionFactory<T>>,
}

impl<T: Send + 'static> Default for ActionRegistry<T> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for ActionRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ActionRegistry")
            .field("actions", &names)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> ActionRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the factory for `name`
    pub fn register<F>(&mut self, name: ActionName, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Action<T>> + Send + Sync + 'static,
    {
        self.factories.insert(name, Arc::new(factory));
        self
    }

    pub fn contains(&self, name: ActionName) -> bool {
        self.factories.contains_key(&name)
    }

    pub fn create(&self, name: ActionName) -> WorkerResult<Arc<dyn Action<T>>> {
        self.factories
            .get(&name)
            .map(|factory| factory())
            .ok_or_else(|| WorkerError::missing_dependency(format!("action:{name}")))
    }

    /// Resolve every name and wrap each action as retry(error-handling(action))
    pub fn build_pipeline(
        &self,
        names: &[ActionName],
        policy: &RetryPolicy,
    ) -> WorkerResult<Pipeline<T>> {
        names.iter().try_fold(Pipeline::new(), |pipeline, name| {
            Ok(pipeline.then_action(self.create(*name)?, policy.clone()))
        })
    }
}

impl ActionRegistry<NotePipelineData> {
    /// Registry holding every built-in note action
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(ActionName::CleanHtml, || Arc::new(CleanHtmlAction))
            .register(ActionName::ParseHtml, || Arc::new(ParseHtmlAction))
            .register(ActionName::SaveNote, || Arc::new(SaveNoteAction))
            .register(ActionName::CompleteImport, || {
                Arc::new(CompleteImportAction)
            });
        registry
    }
}
