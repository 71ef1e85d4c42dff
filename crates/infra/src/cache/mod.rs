//! Tenant-scoped cache: store adapters, key builder, policy table and the
//! cache service that ties them together.

pub mod keys;
pub mod memory_store;
pub mod metrics;
pub mod policy;
pub mod service;
pub mod store;

#[cfg(feature = "redis")]
pub mod redis_store;

pub use keys::CacheKeyBuilder;
pub use memory_store::InMemoryCacheStore;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use policy::{CacheDomain, CachePolicy, CachePolicyTable, CachePriority, CacheSettings};
pub use service::{CacheService, CacheSkip, effective_ttl};
pub use store::{CacheStore, CacheStoreError};

#[cfg(feature = "redis")]
pub use redis_store::RedisCacheStore;
