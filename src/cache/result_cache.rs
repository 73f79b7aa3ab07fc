//! # Two-Tier Result Cache
//!
//! Reads check the in-process tier first, then the external tier; an external
//! hit is promoted into memory under the memory TTL. Writes land in memory
//! synchronously and in the external tier best-effort.
//!
//! The memory tier sits behind a `parking_lot::Mutex` that is only ever held
//! for map operations, never across an `.await`.

use super::memory::MemoryTier;
use super::provider::CacheProvider;
use super::traits::CacheService;
use crate::config::CacheConfig;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Per-write overrides; unset fields fall back to the cache defaults
#[derive(Debug, Clone, Default)]
pub struct CacheSetOptions {
    /// TTL in the external tier
    pub ttl: Option<Duration>,
    /// TTL in the memory tier
    pub memory_ttl: Option<Duration>,
    pub tags: Vec<String>,
}

impl CacheSetOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_memory_ttl(mut self, memory_ttl: Duration) -> Self {
        self.memory_ttl = Some(memory_ttl);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalTierStats {
    pub provider: String,
    pub distributed: bool,
    pub healthy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_size: usize,
    pub memory_keys: Vec<String>,
    pub memory_hits: u64,
    pub external_hits: u64,
    pub misses: u64,
    pub external: ExternalTierStats,
}

#[derive(Debug, Default)]
struct CacheCounters {
    memory_hits: AtomicU64,
    external_hits: AtomicU64,
    misses: AtomicU64,
}

pub struct ResultCache<S: CacheService = CacheProvider> {
    memory: Mutex<MemoryTier>,
    external: S,
    default_ttl: Duration,
    memory_ttl: Duration,
    counters: CacheCounters,
}

impl<S: CacheService> std::fmt::Debug for ResultCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("memory_size", &self.memory.lock().len())
            .field("external", &self.external.provider_name())
            .field("default_ttl", &self.default_ttl)
            .field("memory_ttl", &self.memory_ttl)
            .finish()
    }
}

impl ResultCache<CacheProvider> {
    /// Build a cache whose external tier comes from configuration
    pub async fn from_config(config: &CacheConfig) -> Self {
        let provider = CacheProvider::from_config_graceful(config).await;
        Self::new(provider, config)
    }

    /// Memory tier only; handy for tests and single-process setups
    pub fn memory_only(config: &CacheConfig) -> Self {
        Self::new(CacheProvider::noop(), config)
    }
}

impl<S: CacheService> ResultCache<S> {
    pub fn new(external: S, config: &CacheConfig) -> Self {
        Self {
            memory: Mutex::new(MemoryTier::new(config.max_memory_entries)),
            external,
            default_ttl: config.default_ttl(),
            memory_ttl: config.memory_ttl(),
            counters: CacheCounters::default(),
        }
    }

    pub fn external(&self) -> &S {
        &self.external
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let memory_hit = self.memory.lock().get(key, Instant::now());
        if let Some(value) = memory_hit {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = key, tier = "memory", "Cache hit");
            return Some(value);
        }

        let raw = match self.external.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                trace!(key = key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(
                    key = key,
                    provider = self.external.provider_name(),
                    error = %e,
                    "External cache read failed, treating as miss"
                );
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => {
                self.counters.external_hits.fetch_add(1, Ordering::Relaxed);
                self.memory.lock().insert(
                    key.to_string(),
                    value.clone(),
                    self.memory_ttl,
                    Vec::new(),
                    Instant::now(),
                );
                debug!(key = key, tier = "external", "Cache hit, promoted to memory");
                Some(value)
            }
            Err(e) => {
                warn!(key = key, error = %e, "Undecodable external cache entry, treating as miss");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Typed read; a value that does not decode as `T` counts as absent
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(key = key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: Value, options: CacheSetOptions) {
        let memory_ttl = options.memory_ttl.unwrap_or(self.memory_ttl);
        let ttl = options.ttl.unwrap_or(self.default_ttl);

        let raw = value.to_string();
        let evicted = self.memory.lock().insert(
            key.to_string(),
            value,
            memory_ttl,
            options.tags,
            Instant::now(),
        );
        if evicted > 0 {
            debug!(evicted = evicted, "Memory tier cleanup evicted entries");
        }

        if let Err(e) = self.external.set(key, &raw, ttl).await {
            warn!(
                key = key,
                provider = self.external.provider_name(),
                error = %e,
                "External cache write failed, value kept in memory only"
            );
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, options: CacheSetOptions) {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value, options).await,
            Err(e) => warn!(key = key, error = %e, "Value not serializable, skipping cache write"),
        }
    }

    /// Return the cached value or compute, store and return it
    ///
    /// Errors from `factory` propagate untouched and nothing is cached.
    pub async fn get_or_set<F, Fut, E>(
        &self,
        key: &str,
        factory: F,
        options: CacheSetOptions,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let value = factory().await?;
        self.set(key, value.clone(), options).await;
        Ok(value)
    }

    pub async fn delete(&self, key: &str) {
        self.memory.lock().remove(key);
        if let Err(e) = self.external.delete(key).await {
            warn!(key = key, error = %e, "External cache delete failed");
        }
    }

    /// Remove every key containing `pattern` from both tiers
    ///
    /// Returns the total removed; an unreachable external tier contributes 0.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> u64 {
        let memory_removed = self.memory.lock().remove_matching(pattern) as u64;

        let external_removed = match self.external.delete_pattern(pattern).await {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    pattern = pattern,
                    provider = self.external.provider_name(),
                    error = %e,
                    "External cache pattern invalidation failed"
                );
                0
            }
        };

        debug!(
            pattern = pattern,
            memory_removed = memory_removed,
            external_removed = external_removed,
            "Cache invalidated by pattern"
        );
        memory_removed + external_removed
    }

    /// Remove entries stored with `tag` from the memory tier
    pub fn invalidate_by_tag(&self, tag: &str) -> u64 {
        self.memory.lock().remove_tagged(tag) as u64
    }

    pub async fn clear_all(&self) {
        let cleared = self.memory.lock().clear();
        match self.external.clear().await {
            Ok(external) => debug!(memory = cleared, external = external, "Cache cleared"),
            Err(e) => warn!(error = %e, "External cache clear failed"),
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let (memory_size, memory_keys) = {
            let memory = self.memory.lock();
            (memory.len(), memory.keys())
        };

        let healthy = match self.external.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                debug!(error = %e, "External cache health check failed");
                false
            }
        };

        CacheStats {
            memory_size,
            memory_keys,
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            external_hits: self.counters.external_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            external: ExternalTierStats {
                provider: self.external.provider_name().to_string(),
                distributed: self.external.is_distributed(),
                healthy,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> CacheConfig {
        CacheConfig {
            max_memory_entries: 3,
            memory_ttl_secs: 10,
            ..CacheConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get_until_memory_ttl() {
        let cache = ResultCache::memory_only(&config());
        cache
            .set("note:1", json!({"title": "Soup"}), CacheSetOptions::default())
            .await;

        assert_eq!(cache.get("note:1").await, Some(json!({"title": "Soup"})));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("note:1").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_ttl_override() {
        let cache = ResultCache::memory_only(&config());
        let options = CacheSetOptions::default().with_memory_ttl(Duration::from_secs(2));
        cache.set("k", json!(1), options).await;

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_bounded_memory_tier() {
        let cache = ResultCache::memory_only(&config());
        for i in 0..5 {
            cache
                .set(&format!("k{i}"), json!(i), CacheSetOptions::default())
                .await;
        }

        let stats = cache.stats().await;
        assert_eq!(stats.memory_size, 3);
        assert_eq!(stats.memory_keys, vec!["k2", "k3", "k4"]);
    }

    #[tokio::test]
    async fn test_get_or_set_calls_factory_once() {
        let cache = ResultCache::memory_only(&config());
        let mut calls = 0;

        for _ in 0..2 {
            let value = cache
                .get_or_set(
                    "parsed:abc",
                    || {
                        calls += 1;
                        async { Ok::<_, String>(json!("parsed")) }
                    },
                    CacheSetOptions::default(),
                )
                .await
                .unwrap();
            assert_eq!(value, json!("parsed"));
        }

        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_get_or_set_does_not_cache_errors() {
        let cache = ResultCache::memory_only(&config());
        let result = cache
            .get_or_set(
                "k",
                || async { Err::<Value, _>("parser offline") },
                CacheSetOptions::default(),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Summary {
            ingredients: usize,
        }

        let cache = ResultCache::memory_only(&config());
        cache
            .set_json("summary", &Summary { ingredients: 4 }, CacheSetOptions::default())
            .await;

        assert_eq!(
            cache.get_json::<Summary>("summary").await,
            Some(Summary { ingredients: 4 })
        );
        assert_eq!(cache.get_json::<Vec<String>>("summary").await, None);
    }

    #[tokio::test]
    async fn test_hit_and_miss_counters() {
        let cache = ResultCache::memory_only(&config());
        cache.set("k", json!(1), CacheSetOptions::default()).await;
        cache.get("k").await;
        cache.get("missing").await;

        let stats = cache.stats().await;
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.external.provider, "noop");
        assert!(stats.external.healthy);
    }

    #[tokio::test]
    async fn test_invalidate_by_tag() {
        let cache = ResultCache::memory_only(&CacheConfig::default());
        cache
            .set("a", json!(1), CacheSetOptions::default().with_tag("import:1"))
            .await;
        cache.set("b", json!(2), CacheSetOptions::default()).await;

        assert_eq!(cache.invalidate_by_tag("import:1"), 1);
        assert_eq!(cache.get("b").await, Some(json!(2)));
    }
}
