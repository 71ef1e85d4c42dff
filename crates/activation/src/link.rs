//! Tenant-level activation verdict.

use serde::{Deserialize, Serialize};

use assistsync_core::{ChannelId, TenantId};

/// A tenant's assistant link configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLinkConfig {
    pub tenant_id: TenantId,
    pub linked_channel_id: Option<ChannelId>,
    /// Master switch for the assistant link. `false` silences the assistant
    /// regardless of channel state.
    pub is_active: bool,
}

impl ChannelLinkConfig {
    pub fn unlinked(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            linked_channel_id: None,
            is_active: true,
        }
    }
}

/// Live status record of a channel on the external chat network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub channel_id: ChannelId,
    pub tenant_id: TenantId,
    pub connected: bool,
    pub deleted: bool,
}

/// Why the verdict came out the way it did.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationReason {
    LinkInactive,
    NoChannelLinked,
    ChannelNotFound,
    ChannelNotConnected,
    ChannelConnected,
    /// The channel-status lookup itself failed; resolved as inactive.
    StatusLookupFailed,
}

impl ActivationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationReason::LinkInactive => "link_inactive",
            ActivationReason::NoChannelLinked => "no_channel_linked",
            ActivationReason::ChannelNotFound => "channel_not_found",
            ActivationReason::ChannelNotConnected => "channel_not_connected",
            ActivationReason::ChannelConnected => "channel_connected",
            ActivationReason::StatusLookupFailed => "status_lookup_failed",
        }
    }
}

impl core::fmt::Display for ActivationReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the tenant-level activation rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationVerdict {
    pub active: bool,
    pub reason: ActivationReason,
}

impl ActivationVerdict {
    fn inactive(reason: ActivationReason) -> Self {
        Self {
            active: false,
            reason,
        }
    }

    /// Verdict used when the inputs could not be loaded (fail closed).
    pub fn fail_closed() -> Self {
        Self::inactive(ActivationReason::StatusLookupFailed)
    }
}

/// Evaluate the tenant-level rule.
///
/// `channel` is the live record for `config.linked_channel_id`, if one exists.
/// A missing configuration row is treated as an unlinked, active link.
pub fn evaluate(config: Option<&ChannelLinkConfig>, channel: Option<&ChannelRecord>) -> ActivationVerdict {
    let Some(config) = config else {
        return ActivationVerdict::inactive(ActivationReason::NoChannelLinked);
    };

    if !config.is_active {
        return ActivationVerdict::inactive(ActivationReason::LinkInactive);
    }

    let Some(linked) = config.linked_channel_id.as_ref() else {
        return ActivationVerdict::inactive(ActivationReason::NoChannelLinked);
    };

    let channel = match channel {
        Some(c) if &c.channel_id == linked && c.tenant_id == config.tenant_id && !c.deleted => c,
        _ => return ActivationVerdict::inactive(ActivationReason::ChannelNotFound),
    };

    if !channel.connected {
        return ActivationVerdict::inactive(ActivationReason::ChannelNotConnected);
    }

    ActivationVerdict {
        active: true,
        reason: ActivationReason::ChannelConnected,
    }
}
