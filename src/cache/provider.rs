//! External tier provider with an integrated circuit breaker
//!
//! Enum dispatch over the configured backend. Distributed backends are
//! guarded by a [`CircuitBreaker`]: while open, reads are misses and writes
//! are skipped, so a dead store costs nothing per call.

use super::errors::CacheResult;
use super::providers::NoOpCacheService;
use super::traits::CacheService;
use crate::config::CacheConfig;
use crate::resilience::{CircuitBreaker, CircuitState};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[cfg(feature = "cache-redis")]
use super::providers::RedisCacheService;

#[derive(Debug, Clone)]
enum CacheBackend {
    #[cfg(feature = "cache-redis")]
    Redis(Box<RedisCacheService>),
    NoOp(NoOpCacheService),
}

macro_rules! dispatch {
    ($backend:expr, $svc:ident => $call:expr) => {
        match $backend {
            #[cfg(feature = "cache-redis")]
            CacheBackend::Redis($svc) => $call,
            CacheBackend::NoOp($svc) => $call,
        }
    };
}

#[derive(Clone)]
pub struct CacheProvider {
    backend: CacheBackend,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl std::fmt::Debug for CacheProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheProvider")
            .field("backend", &self.backend)
            .field(
                "circuit_breaker",
                &self.circuit_breaker.as_ref().map(|cb| cb.state()),
            )
            .finish()
    }
}

impl CacheProvider {
    /// Build the provider from configuration, never failing
    ///
    /// An unknown backend, a missing URL, a disabled feature or an unreachable
    /// store all fall back to `NoOp` with a warning.
    pub async fn from_config_graceful(config: &CacheConfig) -> Self {
        let backend = Self::create_backend(config).await;

        let circuit_breaker = if config.circuit_breaker.enabled && backend_is_distributed(&backend)
        {
            let cb = CircuitBreaker::new(
                "cache_external_tier",
                config.circuit_breaker.to_resilience_config(),
            );
            Some(Arc::new(cb))
        } else {
            None
        };

        Self {
            backend,
            circuit_breaker,
        }
    }

    async fn create_backend(config: &CacheConfig) -> CacheBackend {
        match config.backend.as_str() {
            "none" | "noop" | "" => {
                info!("External cache tier disabled, running memory tier only");
                CacheBackend::NoOp(NoOpCacheService::new())
            }
            "redis" => Self::create_redis_backend(config).await,
            other => {
                warn!(backend = other, "Unknown cache backend, falling back to NoOp");
                CacheBackend::NoOp(NoOpCacheService::new())
            }
        }
    }

    #[cfg(feature = "cache-redis")]
    async fn create_redis_backend(config: &CacheConfig) -> CacheBackend {
        let Some(url) = config.redis_url.as_deref() else {
            warn!("Redis cache backend selected without redis_url, falling back to NoOp");
            return CacheBackend::NoOp(NoOpCacheService::new());
        };

        match RedisCacheService::connect(url, config.key_prefix.clone()).await {
            Ok(service) => {
                info!(backend = "redis", "External cache tier connected");
                CacheBackend::Redis(Box::new(service))
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to connect to Redis, falling back to NoOp cache"
                );
                CacheBackend::NoOp(NoOpCacheService::new())
            }
        }
    }

    #[cfg(not(feature = "cache-redis"))]
    async fn create_redis_backend(_config: &CacheConfig) -> CacheBackend {
        warn!("Redis cache backend requested but 'cache-redis' feature not enabled, using NoOp");
        CacheBackend::NoOp(NoOpCacheService::new())
    }

    pub fn noop() -> Self {
        Self {
            backend: CacheBackend::NoOp(NoOpCacheService::new()),
            circuit_breaker: None,
        }
    }

    /// Whether an actual store sits behind this provider
    pub fn is_enabled(&self) -> bool {
        !matches!(self.backend, CacheBackend::NoOp(_))
    }

    /// `None` when no breaker guards this backend
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.circuit_breaker.as_ref().map(|cb| cb.state())
    }

    /// Run `call` through the breaker, returning `when_open` if it is open
    async fn guarded<T, F>(&self, operation: &str, when_open: T, call: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        let Some(cb) = self.circuit_breaker.as_ref() else {
            return call.await;
        };

        if !cb.should_allow() {
            debug!(operation = operation, "Cache circuit open, short-circuiting");
            return Ok(when_open);
        }

        let start = Instant::now();
        let result = call.await;
        match &result {
            Ok(_) => cb.record_success(start.elapsed()),
            Err(_) => cb.record_failure(start.elapsed()),
        }
        result
    }
}

fn backend_is_distributed(backend: &CacheBackend) -> bool {
    dispatch!(backend, svc => svc.is_distributed())
}

impl CacheService for CacheProvider {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.guarded("get", None, async {
            dispatch!(&self.backend, svc => svc.get(key).await)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.guarded("set", (), async {
            dispatch!(&self.backend, svc => svc.set(key, value, ttl).await)
        })
        .await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.guarded("delete", (), async {
            dispatch!(&self.backend, svc => svc.delete(key).await)
        })
        .await
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        self.guarded(
            "delete_pattern",
            0,
            async { dispatch!(&self.backend, svc => svc.delete_pattern(pattern).await) },
        )
        .await
    }

    async fn clear(&self) -> CacheResult<u64> {
        self.guarded("clear", 0, async {
            dispatch!(&self.backend, svc => svc.clear().await)
        })
        .await
    }

    async fn health_check(&self) -> CacheResult<bool> {
        if let Some(cb) = &self.circuit_breaker {
            if cb.state() == CircuitState::Open {
                return Ok(false);
            }
        }
        dispatch!(&self.backend, svc => svc.health_check().await)
    }

    fn provider_name(&self) -> &'static str {
        dispatch!(&self.backend, svc => svc.provider_name())
    }

    fn is_distributed(&self) -> bool {
        backend_is_distributed(&self.backend)
    }
}
