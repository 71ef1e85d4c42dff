use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use assistsync_core::{ConversationId, EventId, TenantId};

/// Server-originated event types.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RealtimeEventType {
    #[serde(rename = "message:new")]
    MessageNew,
    #[serde(rename = "message:updated")]
    MessageUpdated,
    #[serde(rename = "conversation:list:updated")]
    ConversationListUpdated,
    #[serde(rename = "ai_reactivated")]
    AiReactivated,
    #[serde(rename = "ai_config_changed")]
    AiConfigChanged,
}

impl RealtimeEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RealtimeEventType::MessageNew => "message:new",
            RealtimeEventType::MessageUpdated => "message:updated",
            RealtimeEventType::ConversationListUpdated => "conversation:list:updated",
            RealtimeEventType::AiReactivated => "ai_reactivated",
            RealtimeEventType::AiConfigChanged => "ai_config_changed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "message:new" => Some(Self::MessageNew),
            "message:updated" => Some(Self::MessageUpdated),
            "conversation:list:updated" => Some(Self::ConversationListUpdated),
            "ai_reactivated" => Some(Self::AiReactivated),
            "ai_config_changed" => Some(Self::AiConfigChanged),
            _ => None,
        }
    }
}

impl core::fmt::Display for RealtimeEventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral event pushed to sessions. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub event_id: EventId,
    pub event_type: RealtimeEventType,
    pub tenant_id: TenantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub payload: JsonValue,
    pub timestamp: DateTime<Utc>,
}

impl RealtimeEvent {
    pub fn tenant(event_type: RealtimeEventType, tenant_id: TenantId, payload: JsonValue) -> Self {
        Self {
            event_id: EventId::new(),
            event_type,
            tenant_id,
            conversation_id: None,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn conversation(
        event_type: RealtimeEventType,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        payload: JsonValue,
    ) -> Self {
        Self {
            conversation_id: Some(conversation_id),
            ..Self::tenant(event_type, tenant_id, payload)
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_uses_wire_names() {
        let json = serde_json::to_string(&RealtimeEventType::ConversationListUpdated).unwrap();
        assert_eq!(json, "\"conversation:list:updated\"");
        for t in [
            RealtimeEventType::MessageNew,
            RealtimeEventType::MessageUpdated,
            RealtimeEventType::ConversationListUpdated,
            RealtimeEventType::AiReactivated,
            RealtimeEventType::AiConfigChanged,
        ] {
            assert_eq!(RealtimeEventType::parse(t.as_str()), Some(t));
        }
    }

    #[test]
    fn tenant_events_omit_conversation_id() {
        let ev = RealtimeEvent::tenant(
            RealtimeEventType::AiConfigChanged,
            TenantId::new(9),
            serde_json::json!({"active": true}),
        );
        let json = serde_json::to_value(&ev).unwrap();
        assert!(json.get("conversation_id").is_none());
        assert_eq!(json["event_type"], "ai_config_changed");
        assert_eq!(json["tenant_id"], 9);
    }
}
