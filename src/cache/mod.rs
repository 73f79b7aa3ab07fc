//! # Result Cache
//!
//! Two-tier cache used by pipeline actions to skip redundant work.
//!
//! ```text
//! ResultCache
//!   ├── MemoryTier              <- bounded, TTL-checked, in-process
//!   └── CacheProvider (enum)    <- external tier behind a circuit breaker
//!         ├── Redis(RedisCacheService)   (feature "cache-redis")
//!         └── NoOp(NoOpCacheService)     always miss, always succeed
//! ```
//!
//! External-tier failures never reach callers. A store that cannot be reached
//! at startup degrades to `NoOp`; one that fails later is logged and, after
//! enough consecutive failures, short-circuited by the breaker.

pub mod errors;
pub mod memory;
pub mod provider;
pub mod providers;
pub mod result_cache;
pub mod traits;

pub use errors::{CacheError, CacheResult};
pub use memory::MemoryTier;
pub use provider::CacheProvider;
pub use providers::NoOpCacheService;
pub use result_cache::{CacheSetOptions, CacheStats, ExternalTierStats, ResultCache};
pub use traits::CacheService;

#[cfg(feature = "cache-redis")]
pub use providers::RedisCacheService;
