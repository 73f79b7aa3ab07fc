//! # Resilience
//!
//! Circuit breaking for collaborators that live on the other side of a
//! network hop. The result cache wraps its external tier in one so that a dead
//! store degrades to cache misses without paying a timeout on every call.

pub mod circuit_breaker;
pub mod config;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerSnapshot, CircuitState};
pub use config::CircuitBreakerConfig;
