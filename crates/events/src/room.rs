use serde::{Deserialize, Serialize};

use assistsync_core::{ConversationId, TenantId};

/// A delivery target. Every room belongs to exactly one tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Room {
    Tenant { tenant_id: TenantId },
    Conversation { tenant_id: TenantId, conversation_id: ConversationId },
}

impl Room {
    pub fn tenant(tenant_id: TenantId) -> Self {
        Room::Tenant { tenant_id }
    }

    pub fn conversation(tenant_id: TenantId, conversation_id: ConversationId) -> Self {
        Room::Conversation {
            tenant_id,
            conversation_id,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            Room::Tenant { tenant_id } | Room::Conversation { tenant_id, .. } => *tenant_id,
        }
    }

    /// Stable room name, e.g. `tenant_9` or `tenant_9:conversation_42`.
    pub fn name(&self) -> String {
        match self {
            Room::Tenant { tenant_id } => format!("tenant_{tenant_id}"),
            Room::Conversation {
                tenant_id,
                conversation_id,
            } => format!("tenant_{tenant_id}:conversation_{conversation_id}"),
        }
    }
}

impl core::fmt::Display for Room {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name())
    }
}
