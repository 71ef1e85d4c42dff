//! API-side authorization guard.
//!
//! Handlers call [`require`] before touching a service, keeping the services
//! themselves auth-agnostic.

use assistsync_auth::{AuthzError, Permission, Principal, authorize};

use crate::context::{PrincipalContext, TenantContext};

/// Check that the request's principal holds `permission` in the active tenant.
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &Permission,
) -> Result<(), AuthzError> {
    let principal = Principal {
        user_id: principal.user_id(),
        active_tenant_id: tenant.tenant_id(),
        membership_tenant_id: principal.membership_tenant_id(),
        roles: principal.roles().to_vec(),
    };

    authorize(&principal, permission)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistsync_auth::Role;
    use assistsync_core::{TenantId, UserId};

    #[test]
    fn receptionist_may_write_conversations_only() {
        let tenant = TenantContext::new(TenantId::new(3));
        let principal = PrincipalContext::new(UserId::new(8), TenantId::new(3), vec![Role::new("receptionist")]);

        assert!(require(&tenant, &principal, &Permission::conversations_write()).is_ok());
        assert_eq!(
            require(&tenant, &principal, &Permission::ai_config_write()),
            Err(AuthzError::Forbidden("ai_config.write".to_string()))
        );
    }

    #[test]
    fn membership_in_another_tenant_is_rejected() {
        let tenant = TenantContext::new(TenantId::new(3));
        let principal = PrincipalContext::new(UserId::new(8), TenantId::new(4), vec![Role::admin()]);

        assert_eq!(
            require(&tenant, &principal, &Permission::cache_admin()),
            Err(AuthzError::TenantMismatch)
        );
    }
}
