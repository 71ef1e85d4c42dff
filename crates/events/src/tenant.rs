use assistsync_core::TenantId;

use crate::{RealtimeEvent, Room};

/// Helper trait for tenant-scoped messages.
///
/// The hub uses it to refuse deliveries whose room and event disagree on the
/// tenant, and sessions use it to drop anything not addressed to them.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl TenantScoped for RealtimeEvent {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

impl TenantScoped for Room {
    fn tenant_id(&self) -> TenantId {
        Room::tenant_id(self)
    }
}
