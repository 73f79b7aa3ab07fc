//! Cache error types

use thiserror::Error;

/// Errors raised by the external cache tier
///
/// These never escape [`ResultCache`](super::ResultCache); they are logged
/// and turned into misses or skipped writes.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    #[error("Cache serialization error: {0}")]
    SerializationError(String),

    #[error("Cache operation timed out: {0}")]
    Timeout(String),

    #[error("Cache backend error: {0}")]
    BackendError(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        CacheError::SerializationError(error.to_string())
    }
}

impl From<CacheError> for crate::error::WorkerError {
    fn from(error: CacheError) -> Self {
        crate::error::WorkerError::execution("result_cache", "cache operation failed", error.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
