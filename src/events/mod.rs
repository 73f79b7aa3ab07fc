//! # Status Events
//!
//! Progress records emitted by pipeline actions and the dispatcher, and the
//! publishers that carry them to persistence and to connected browsers.

pub mod publisher;
pub mod status_event;

pub use publisher::{PersistingStatusPublisher, StatusPublisher};
pub use status_event::{EventPriority, StatusEvent};
