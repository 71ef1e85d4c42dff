//! Infrastructure layer: cache, source-of-truth stores, activation services,
//! realtime bridging and configuration.

pub mod activation;
pub mod cache;
pub mod config;
pub mod realtime;
pub mod store;
pub mod tenant_context;

pub use config::{AppConfig, ConfigError};
pub use tenant_context::{TaskLocalTenant, TenantScope};
