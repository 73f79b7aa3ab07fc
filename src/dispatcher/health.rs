//! Service health gate checked before every job

use crate::cache::{CacheService, ResultCache};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckStatus {
    pub healthy: bool,
    /// Failing non-critical checks are reported but do not fail the service
    pub critical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub healthy: bool,
    pub checks: BTreeMap<String, CheckStatus>,
}

impl ServiceHealth {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            checks: BTreeMap::new(),
        }
    }

    /// Names of the critical checks that failed
    pub fn failing_checks(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, status)| status.critical && !status.healthy)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[async_trait]
pub trait HealthMonitor: Send + Sync {
    async fn check_health(&self) -> ServiceHealth;
}

/// One named probe contributing to [`ServiceHealth`]
#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    fn is_critical(&self) -> bool {
        true
    }

    async fn check(&self) -> Result<(), String>;
}

/// Runs every registered check concurrently
#[derive(Default, Clone)]
pub struct CompositeHealthMonitor {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl std::fmt::Debug for CompositeHealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeHealthMonitor")
            .field(
                "checks",
                &self.checks.iter().map(|c| c.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl CompositeHealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }
}

#[async_trait]
impl HealthMonitor for CompositeHealthMonitor {
    async fn check_health(&self) -> ServiceHealth {
        let results = join_all(self.checks.iter().map(|check| async move {
            let result = check.check().await;
            (check.name().to_string(), check.is_critical(), result)
        }))
        .await;

        let mut health = ServiceHealth::healthy();
        for (name, critical, result) in results {
            let status = match result {
                Ok(()) => CheckStatus {
                    healthy: true,
                    critical,
                    detail: None,
                },
                Err(detail) => CheckStatus {
                    healthy: false,
                    critical,
                    detail: Some(detail),
                },
            };
            if critical && !status.healthy {
                health.healthy = false;
            }
            health.checks.insert(name, status);
        }
        health
    }
}

/// External cache tier probe
///
/// Non-critical: jobs keep running without the external tier.
pub struct CacheHealthCheck<S: CacheService + 'static> {
    cache: Arc<ResultCache<S>>,
}

impl<S: CacheService + 'static> CacheHealthCheck<S> {
    pub fn new(cache: Arc<ResultCache<S>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: CacheService + 'static> HealthCheck for CacheHealthCheck<S> {
    fn name(&self) -> &str {
        "cache"
    }

    fn is_critical(&self) -> bool {
        false
    }

    async fn check(&self) -> Result<(), String> {
        match self.cache.external().health_check().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!(
                "{} cache tier reported unhealthy",
                self.cache.external().provider_name()
            )),
            Err(e) => Err(e.to_string()),
        }
    }
}
