//! Tenant context seam.
//!
//! Every cache key, rule evaluation and realtime room is scoped to exactly one
//! tenant. Components that must know "who is asking" depend on
//! [`TenantContextProvider`] rather than on a request type, so the same cache
//! service works inside HTTP handlers, background sweeps and tests.

use std::sync::Arc;

use crate::TenantId;

/// Resolves the tenant on whose behalf the current unit of work runs.
///
/// `None` means no tenant could be resolved; callers must treat that as
/// "refuse", never as "any tenant".
pub trait TenantContextProvider: Send + Sync {
    fn current_tenant(&self) -> Option<TenantId>;
}

impl<P> TenantContextProvider for Arc<P>
where
    P: TenantContextProvider + ?Sized,
{
    fn current_tenant(&self) -> Option<TenantId> {
        (**self).current_tenant()
    }
}

/// Explicit, fixed tenant context (workers, tests, CLI tools).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FixedTenant(Option<TenantId>);

impl FixedTenant {
    pub fn new(tenant_id: TenantId) -> Self {
        Self(Some(tenant_id))
    }

    /// A context that never resolves a tenant.
    pub fn none() -> Self {
        Self(None)
    }
}

impl TenantContextProvider for FixedTenant {
    fn current_tenant(&self) -> Option<TenantId> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_tenant_resolves_through_arc() {
        let provider: Arc<dyn TenantContextProvider> = Arc::new(FixedTenant::new(TenantId::new(9)));
        assert_eq!(provider.current_tenant(), Some(TenantId::new(9)));
        assert_eq!(FixedTenant::none().current_tenant(), None);
    }
}
