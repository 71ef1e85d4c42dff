//! Cache service: tenant-checked get/set/invalidate over a [`CacheStore`].
//!
//! Every failure mode degrades to a miss or a no-op. Nothing here returns an
//! error into request handling; [`CacheSkip`] only reports why an operation
//! was declined.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use assistsync_core::{TenantContextProvider, TenantId};

use super::keys::CacheKeyBuilder;
use super::metrics::{CacheMetrics, CacheMetricsSnapshot};
use super::policy::{CacheDomain, CachePolicy, CachePolicyTable, CachePriority};
use super::store::CacheStore;

const SMALL_PAYLOAD_BYTES: usize = 1024;
const LARGE_PAYLOAD_BYTES: usize = 10 * 1024;

/// Why an operation was declined.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CacheSkip {
    #[error("no tenant in context")]
    NoTenant,

    #[error("key or pattern not owned by the current tenant")]
    TenantMismatch,

    #[error("caching disabled for domain")]
    PolicyDisabled,

    #[error("cache store unavailable")]
    Unavailable,

    #[error("value could not be serialized")]
    Serialization,
}

pub struct CacheService {
    store: Arc<dyn CacheStore>,
    policies: Arc<CachePolicyTable>,
    tenants: Arc<dyn TenantContextProvider>,
    metrics: Arc<CacheMetrics>,
}

impl CacheService {
    pub fn new(
        store: Arc<dyn CacheStore>,
        policies: Arc<CachePolicyTable>,
        tenants: Arc<dyn TenantContextProvider>,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            store,
            policies,
            tenants,
            metrics,
        }
    }

    pub fn policies(&self) -> &CachePolicyTable {
        &self.policies
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    /// Tenant of the current context.
    pub fn current_tenant(&self) -> Option<TenantId> {
        self.tenants.current_tenant()
    }

    /// Read and deserialize. Any skip or decode failure is a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, domain: CacheDomain) -> Option<T> {
        let raw = self.get_raw(key, domain).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "cached value failed to decode; treating as miss");
                None
            }
        }
    }

    pub async fn get_raw(&self, key: &str, domain: CacheDomain) -> Option<String> {
        self.admit(key, Some(domain)).ok()?;

        match self.store.get(key).await {
            Ok(Some(value)) => {
                self.metrics.record_hit();
                debug!(key = %key, "cache hit");
                Some(value)
            }
            Ok(None) => {
                self.metrics.record_miss();
                debug!(key = %key, "cache miss");
                None
            }
            Err(e) => {
                self.metrics.record_skip();
                warn!(key = %key, error = %e, "cache read failed; serving from source");
                None
            }
        }
    }

    /// Serialize and store. Returns the effective TTL.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        domain: CacheDomain,
    ) -> Result<Duration, CacheSkip> {
        let raw = serde_json::to_string(value).map_err(|e| {
            warn!(key = %key, error = %e, "value not cacheable");
            CacheSkip::Serialization
        })?;
        self.set_raw(key, raw, domain).await
    }

    pub async fn set_raw(&self, key: &str, value: String, domain: CacheDomain) -> Result<Duration, CacheSkip> {
        self.admit(key, Some(domain))?;

        let ttl = effective_ttl(self.policies.policy(domain), value.len());
        match self.store.set(key, value, ttl).await {
            Ok(()) => {
                self.metrics.record_set();
                debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set");
                Ok(ttl)
            }
            Err(e) => {
                self.metrics.record_skip();
                warn!(key = %key, error = %e, "cache write failed; continuing without cache");
                Err(CacheSkip::Unavailable)
            }
        }
    }

    /// Delete every key matching `pattern`. The pattern must carry the current
    /// tenant's prefix.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64, CacheSkip> {
        self.admit(pattern, None)?;

        match self.store.delete_pattern(pattern).await {
            Ok(removed) => {
                self.metrics.record_deletes(removed);
                debug!(pattern = %pattern, removed, "cache invalidated");
                Ok(removed)
            }
            Err(e) => {
                self.metrics.record_skip();
                warn!(pattern = %pattern, error = %e, "cache invalidation failed");
                Err(CacheSkip::Unavailable)
            }
        }
    }

    /// Invalidate `tenant_<current>:<domain>:*`.
    pub async fn invalidate_domain(&self, domain: CacheDomain) -> Result<u64, CacheSkip> {
        let tenant_id = self.require_tenant()?;
        self.invalidate_pattern(&CacheKeyBuilder::domain_pattern(tenant_id, domain))
            .await
    }

    /// Invalidate every key of the current tenant.
    pub async fn invalidate_tenant(&self) -> Result<u64, CacheSkip> {
        let tenant_id = self.require_tenant()?;
        self.invalidate_pattern(&CacheKeyBuilder::tenant_pattern(tenant_id)).await
    }

    /// Cache-aside read.
    ///
    /// No single-flight: concurrent misses on the same key each run `loader`.
    /// Loader errors are returned as-is and nothing is cached.
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &str, domain: CacheDomain, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key, domain).await {
            return Ok(hit);
        }

        let value = loader().await?;
        let _ = self.set(key, &value, domain).await;
        Ok(value)
    }

    fn require_tenant(&self) -> Result<TenantId, CacheSkip> {
        self.tenants.current_tenant().ok_or_else(|| {
            self.metrics.record_skip();
            warn!("cache operation without tenant context refused");
            CacheSkip::NoTenant
        })
    }

    /// Tenant ownership, policy and availability checks shared by every operation.
    fn admit(&self, key: &str, domain: Option<CacheDomain>) -> Result<TenantId, CacheSkip> {
        let tenant_id = self.require_tenant()?;

        if !CacheKeyBuilder::belongs_to(key, tenant_id) {
            self.metrics.record_skip();
            warn!(tenant_id = %tenant_id, key = %key, "cache key not owned by tenant; refused");
            return Err(CacheSkip::TenantMismatch);
        }

        if let Some(domain) = domain {
            if !self.policies.is_enabled(domain) {
                self.metrics.record_skip();
                debug!(domain = %domain, "caching disabled for domain");
                return Err(CacheSkip::PolicyDisabled);
            }
        }

        if !self.store.is_available() {
            self.metrics.record_skip();
            warn!(key = %key, "cache store unavailable; skipping");
            return Err(CacheSkip::Unavailable);
        }

        Ok(tenant_id)
    }
}

impl core::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheService")
            .field("available", &self.store.is_available())
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}

/// Policy TTL adjusted for payload size and domain priority.
///
/// Small payloads (<1KB) live 1.5x longer, large ones (>10KB) 0.8x; high
/// priority domains get a further 1.2x. Never below one second.
pub fn effective_ttl(policy: &CachePolicy, payload_len: usize) -> Duration {
    let mut secs = policy.ttl.as_secs_f64();

    if payload_len < SMALL_PAYLOAD_BYTES {
        secs *= 1.5;
    } else if payload_len > LARGE_PAYLOAD_BYTES {
        secs *= 0.8;
    }

    if policy.priority == CachePriority::High {
        secs *= 1.2;
    }

    Duration::from_secs(secs.round().max(1.0) as u64)
}
