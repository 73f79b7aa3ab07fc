//! # Action & Pipeline Framework
//!
//! Named processing steps composed into ordered pipelines with uniform
//! validation, error normalisation and retry.
//!
//! ## Composition
//!
//! ```text
//! Pipeline
//!   └── RetryAction            decides whether to call inner again
//!         └── ErrorHandlingAction   normalises every failure into WorkerError
//!               └── dyn Action       validate_input, then execute
//! ```
//!
//! The output of step N is the only input of step N+1. Actions reach the
//! cache, the status publisher and persistence through [`ActionDependencies`],
//! never through globals.

pub mod data;
pub mod note_actions;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod traits;
pub mod wrappers;

pub use data::{ActionDependencies, NotePipelineData};
pub use note_actions::{CleanHtmlAction, CompleteImportAction, ParseHtmlAction, SaveNoteAction};
pub use pipeline::{Pipeline, PipelineReport, StepReport};
pub use registry::{ActionFactory, ActionName, ActionRegistry};
pub use retry::RetryPolicy;
pub use traits::{Action, ActionContext, Invocable};
pub use wrappers::{ErrorHandlingAction, RetryAction};
