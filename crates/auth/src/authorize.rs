use std::collections::HashSet;

use thiserror::Error;

use assistsync_core::{TenantId, UserId};

use crate::{Permission, Role};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    /// Tenant the request is acting within.
    pub active_tenant_id: TenantId,
    /// Tenant the roles were granted in (from the token).
    pub membership_tenant_id: TenantId,
    pub roles: Vec<Role>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal within its active tenant context.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership_tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let granted: Vec<Permission> = principal.roles.iter().flat_map(Role::permissions).collect();
    let perms: HashSet<&str> = granted.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(roles: Vec<Role>) -> Principal {
        Principal {
            user_id: UserId::new(5),
            active_tenant_id: TenantId::new(9),
            membership_tenant_id: TenantId::new(9),
            roles,
        }
    }

    #[test]
    fn admin_wildcard_allows_everything() {
        assert!(authorize(&principal(vec![Role::admin()]), &Permission::cache_admin()).is_ok());
    }

    #[test]
    fn professional_can_write_conversations_but_not_config() {
        let p = principal(vec![Role::professional()]);
        assert!(authorize(&p, &Permission::conversations_write()).is_ok());
        assert_eq!(
            authorize(&p, &Permission::ai_config_write()),
            Err(AuthzError::Forbidden("ai_config.write".to_string()))
        );
    }

    #[test]
    fn foreign_tenant_is_rejected_before_permissions() {
        let mut p = principal(vec![Role::admin()]);
        p.active_tenant_id = TenantId::new(10);
        assert_eq!(authorize(&p, &Permission::cache_admin()), Err(AuthzError::TenantMismatch));
    }
}
