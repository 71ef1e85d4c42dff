//! Task-local tenant scope.
//!
//! The auth middleware runs every request inside [`TenantScope::run`]; code that
//! needs the current tenant (the cache service, mostly) reads it through
//! [`TaskLocalTenant`]. Background work acting on behalf of a tenant enters the
//! scope explicitly.

use std::future::Future;

use assistsync_core::{TenantContextProvider, TenantId};

tokio::task_local! {
    static CURRENT_TENANT: TenantId;
}

#[derive(Debug, Clone, Copy)]
pub struct TenantScope;

impl TenantScope {
    /// Run `fut` with `tenant_id` as the current tenant.
    pub async fn run<F>(tenant_id: TenantId, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_TENANT.scope(tenant_id, fut).await
    }

    /// Tenant of the enclosing scope, if any.
    pub fn current() -> Option<TenantId> {
        CURRENT_TENANT.try_with(|t| *t).ok()
    }
}

/// Resolves the tenant from the enclosing [`TenantScope`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskLocalTenant;

impl TenantContextProvider for TaskLocalTenant {
    fn current_tenant(&self) -> Option<TenantId> {
        TenantScope::current()
    }
}
