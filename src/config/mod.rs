//! # Importer Configuration
//!
//! Layered configuration for the worker: compiled defaults, then an optional
//! TOML file, then `IMPORTER__`-prefixed environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use importer_core::config::ImporterConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ImporterConfig::load()?;
//! println!("max clients: {}", config.broadcast.max_clients);
//! # Ok(())
//! # }
//! ```
//!
//! Any field can be overridden from the environment, nesting with `__`:
//! `IMPORTER__BROADCAST__MAX_CLIENTS=250`.

pub mod error;
pub mod loader;

use crate::actions::{ActionName, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ImporterConfig {
    /// Deployment environment (development, test, production)
    pub environment: String,
    pub logging: LoggingConfig,
    /// Default retry policy attached to every pipeline action
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    pub broadcast: BroadcastConfig,
    pub dispatcher: DispatcherConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Explicit filter directive; falls back to an environment-derived level
    pub level: Option<String>,
    /// Emit console logs as JSON instead of human-readable lines
    pub json: bool,
    /// Directory for the JSON log file; no file is written when unset
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// External tier backend: "none" or "redis"
    pub backend: String,
    pub redis_url: Option<String>,
    /// Namespace prepended to every external-tier key
    pub key_prefix: String,
    /// Maximum number of entries held in the in-process tier
    pub max_memory_entries: usize,
    /// Default TTL for the external tier
    pub default_ttl_secs: u64,
    /// Default TTL for the in-process tier (also used on promotion)
    pub memory_ttl_secs: u64,
    pub circuit_breaker: CircuitBreakerSettings,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: "none".to_string(),
            redis_url: None,
            key_prefix: "importer:".to_string(),
            max_memory_entries: 1000,
            default_ttl_secs: 3600,
            memory_ttl_secs: 300,
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub timeout_secs: u64,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            timeout_secs: 30,
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn to_resilience_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            timeout: Duration::from_secs(self.timeout_secs),
            success_threshold: self.success_threshold,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Connections beyond this are closed with 1013
    pub max_clients: usize,
    pub heartbeat_interval_ms: u64,
    /// Delay between the first pending non-critical event and the batch flush
    pub batch_delay_ms: u64,
    pub max_batch_size: usize,
    /// Minimum interval between two non-critical messages to one client
    pub rate_limit_ms: u64,
    /// Outbound frame buffer per WebSocket connection
    pub client_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_clients: 100,
            heartbeat_interval_ms: 30_000,
            batch_delay_ms: 100,
            max_batch_size: 10,
            rate_limit_ms: 50,
            client_buffer: 256,
        }
    }
}

impl BroadcastConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// A client silent for longer than this is considered dead
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_interval() * 2
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Name of the queue this worker consumes
    pub queue_name: String,
    /// Attempts the external queue grants a job before it is terminal
    pub max_job_attempts: u32,
    /// Ordered action chain run for every note job
    pub pipeline: Vec<ActionName>,
    pub fan_out: FanOutConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_name: crate::constants::queues::NOTE_PROCESSING.to_string(),
            max_job_attempts: 3,
            pipeline: ActionName::default_pipeline().to_vec(),
            fan_out: FanOutConfig::default(),
        }
    }
}

/// Priorities for follow-up jobs; lower numbers are processed first
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FanOutConfig {
    pub enabled: bool,
    pub ingredient_priority: u8,
    pub instruction_priority: u8,
    pub image_priority: u8,
    pub categorization_priority: u8,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ingredient_priority: 1,
            instruction_priority: 1,
            image_priority: 5,
            categorization_priority: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub ws_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8081".to_string(),
            ws_path: "/ws".to_string(),
        }
    }
}

impl ImporterConfig {
    /// Check cross-field invariants that serde cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        self.retry
            .validate()
            .map_err(|reason| ConfigurationError::invalid_value("retry", reason))?;

        if self.cache.max_memory_entries == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.max_memory_entries",
                "must be greater than 0",
            ));
        }
        if self.cache.memory_ttl_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.memory_ttl_secs",
                "must be greater than 0",
            ));
        }
        if self.cache.backend == "redis" && self.cache.redis_url.is_none() {
            return Err(ConfigurationError::invalid_value(
                "cache.redis_url",
                "required when cache.backend = \"redis\"",
            ));
        }

        if self.broadcast.max_clients == 0 {
            return Err(ConfigurationError::invalid_value(
                "broadcast.max_clients",
                "must be greater than 0",
            ));
        }
        if self.broadcast.heartbeat_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "broadcast.heartbeat_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.broadcast.max_batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "broadcast.max_batch_size",
                "must be greater than 0",
            ));
        }
        if self.broadcast.client_buffer == 0 {
            return Err(ConfigurationError::invalid_value(
                "broadcast.client_buffer",
                "must be greater than 0",
            ));
        }

        if self.dispatcher.pipeline.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "dispatcher.pipeline",
                "at least one action is required",
            ));
        }
        if self.dispatcher.max_job_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatcher.max_job_attempts",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}
