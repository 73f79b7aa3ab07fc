#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Importer Core
//!
//! Background worker core for recipe imports.
//!
//! ## Overview
//!
//! A note import arrives as a job on an external queue. The worker cleans and
//! parses the HTML, stores the note, fans follow-up work out to downstream
//! queues and reports progress to every browser watching the import.
//!
//! ## Module Organization
//!
//! - [`actions`] - Named processing steps, retry and error-handling wrappers, pipelines
//! - [`cache`] - Two-tier result cache (in-process + optional Redis)
//! - [`dispatcher`] - Job state machine, health gate, fan-out and error classification
//! - [`broadcast`] - WebSocket broadcast manager with batching and heartbeats
//! - [`events`] - Status events and publishers
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup and helpers
//! - [`resilience`] - Circuit breaker guarding the external cache tier
//! - [`services`] - Interfaces to the parser and persistence
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use importer_core::actions::ActionDependencies;
//! use importer_core::broadcast::BroadcastManager;
//! use importer_core::config::ImporterConfig;
//! use importer_core::dispatcher::NoteJobDispatcher;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ImporterConfig::load()?;
//! let broadcaster = BroadcastManager::new(config.broadcast.clone());
//!
//! let dispatcher = NoteJobDispatcher::builder()
//!     .config(config.dispatcher.clone())
//!     .retry_policy(config.retry.clone())
//!     .dependencies(ActionDependencies::new().with_status(Arc::new(broadcaster)))
//!     .build()?;
//! # let _ = dispatcher;
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod broadcast;
pub mod cache;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod logging;
pub mod resilience;
pub mod services;

pub use actions::{
    Action, ActionContext, ActionDependencies, ActionName, ActionRegistry, NotePipelineData,
    Pipeline, RetryPolicy,
};
pub use broadcast::{BroadcastManager, BroadcastStats, ClientSocket};
pub use cache::{CacheProvider, CacheService, CacheSetOptions, ResultCache};
pub use config::ImporterConfig;
pub use constants::ImportStatus;
pub use dispatcher::{Job, JobFailure, JobOutcome, NoteJobDispatcher};
pub use error::{ErrorKind, WorkerError, WorkerResult};
pub use events::{EventPriority, StatusEvent, StatusPublisher};
