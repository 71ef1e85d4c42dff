use assistsync_auth::Role;
use assistsync_core::{TenantId, UserId};

/// Tenant context for a request.
///
/// This is immutable and must be present for all tenant routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Principal context for a request (authenticated user + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    /// Tenant the roles were granted in.
    membership_tenant_id: TenantId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, membership_tenant_id: TenantId, roles: Vec<Role>) -> Self {
        Self {
            user_id,
            membership_tenant_id,
            roles,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn membership_tenant_id(&self) -> TenantId {
        self.membership_tenant_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}
