//! # Structured Logging Module
//!
//! Environment-aware structured logging for the worker and the status server.
//! Console output is always on; a JSON log file is added when a log directory
//! is configured.

use crate::config::LoggingConfig;
use chrono::Utc;
use std::fs;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize structured logging for the given environment
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_structured_logging(config: &LoggingConfig, environment: &str) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = match &config.level {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(get_log_level(environment))),
        };

        let pid = process::id();
        let mut file_error = None;
        let file_layer = config.log_dir.as_ref().and_then(|log_dir| {
            if let Err(e) = fs::create_dir_all(log_dir) {
                file_error = Some(format!("{}: {e}", log_dir.display()));
                return None;
            }
            let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
            let file_name = format!("{environment}.{pid}.{timestamp}.log");
            let appender = tracing_appender::rolling::never(log_dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .json(),
            )
        });

        let json_console = config
            .json
            .then(|| fmt::layer().with_target(true).json());
        let plain_console = (!config.json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
        });

        let result = tracing_subscriber::registry()
            .with(filter)
            .with(json_console)
            .with(plain_console)
            .with(file_layer)
            .try_init();

        if result.is_err() {
            // Someone (usually a test harness) installed a subscriber first
            tracing::debug!("Global tracing subscriber already initialized");
        }

        if let Some(error) = file_error {
            tracing::warn!(error = %error, "Could not create log directory, file logging disabled");
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            json = config.json,
            log_dir = ?config.log_dir,
            "Structured logging initialized"
        );
    });
}

/// Default log level for an environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log a job lifecycle transition
pub fn log_job_operation(
    operation: &str,
    job_id: &str,
    queue_name: &str,
    attempt: u32,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        job_id = %job_id,
        queue_name = %queue_name,
        attempt = attempt,
        status = %status,
        details = details,
        "JOB_OPERATION"
    );
}

/// Log a pipeline action outcome
pub fn log_action_operation(
    action: &str,
    job_id: &str,
    attempt: u32,
    status: &str,
    duration_ms: Option<u64>,
) {
    tracing::debug!(
        action = %action,
        job_id = %job_id,
        attempt = attempt,
        status = %status,
        duration_ms = duration_ms,
        "ACTION_OPERATION"
    );
}

/// Log a broadcast connection event
pub fn log_broadcast_operation(operation: &str, client_id: Option<&str>, connected_clients: usize) {
    tracing::debug!(
        operation = %operation,
        client_id = client_id,
        connected_clients = connected_clients,
        "BROADCAST_OPERATION"
    );
}

/// Log an error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        "ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: Some("info".to_string()),
            json: false,
            log_dir: Some(dir.path().to_path_buf()),
        };

        init_structured_logging(&config, "test");
        init_structured_logging(&config, "test");

        log_job_operation("validate", "job-1", "note-processing", 1, "ok", None);
    }
}
