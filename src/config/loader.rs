//! Configuration Loader
//!
//! Builds [`ImporterConfig`] from layered sources with the `config` crate.
//! Later sources override earlier ones:
//!
//! 1. compiled defaults (`#[serde(default)]` on every section)
//! 2. a TOML file (`config/importer.toml` unless a path is given)
//! 3. environment variables, `IMPORTER__SECTION__FIELD`

use super::error::{ConfigResult, ConfigurationError};
use super::ImporterConfig;
use config::{Config, Environment, File, FileFormat};
use std::path::Path;
use tracing::debug;

/// Default file looked up relative to the working directory (extension implied)
pub const DEFAULT_CONFIG_FILE: &str = "config/importer";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "IMPORTER";

impl ImporterConfig {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(None)
    }

    /// Load configuration from a specific TOML file
    ///
    /// An explicit path must exist; the default file is optional.
    pub fn load_from(path: Option<&Path>) -> ConfigResult<Self> {
        let file_source = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE)
                .format(FileFormat::Toml)
                .required(false),
        };

        let settings = Config::builder()
            .add_source(file_source)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("dispatcher.pipeline")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: ImporterConfig = settings.try_deserialize()?;
        if config.environment.is_empty() {
            config.environment = detect_environment();
        }

        config.validate()?;

        debug!(
            environment = %config.environment,
            cache_backend = %config.cache.backend,
            max_clients = config.broadcast.max_clients,
            pipeline = ?config.dispatcher.pipeline,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Parse configuration from an in-memory TOML document, without env overrides
    pub fn from_toml_str(toml: &str) -> ConfigResult<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .map_err(ConfigurationError::from)?;

        let mut config: ImporterConfig = settings.try_deserialize()?;
        if config.environment.is_empty() {
            config.environment = detect_environment();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Current environment from environment variables
pub fn detect_environment() -> String {
    std::env::var("IMPORTER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}
