//! External cache tier contract

use super::errors::CacheResult;
use std::time::Duration;

/// Operations the external (durable) tier must support
///
/// Values are opaque strings; the result cache stores JSON text. Keys are
/// logical keys, any namespacing is the implementation's business.
pub trait CacheService: Send + Sync {
    /// `Ok(None)` is a miss
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = CacheResult<Option<String>>> + Send;

    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    fn delete(&self, key: &str) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Delete every key containing `pattern` as a substring, returning the count
    fn delete_pattern(
        &self,
        pattern: &str,
    ) -> impl std::future::Future<Output = CacheResult<u64>> + Send;

    /// Remove every key this service owns
    fn clear(&self) -> impl std::future::Future<Output = CacheResult<u64>> + Send;

    fn health_check(&self) -> impl std::future::Future<Output = CacheResult<bool>> + Send;

    fn provider_name(&self) -> &'static str;

    /// Whether calls cross a network hop and deserve circuit breaking
    fn is_distributed(&self) -> bool {
        false
    }
}
