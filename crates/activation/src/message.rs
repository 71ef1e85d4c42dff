//! Pause-on-human-intervention decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use assistsync_core::UserId;

use crate::state::{ConversationAiState, PausePolicy};

/// Who authored an outbound message, as classified by the message-creation API.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageSender {
    Human { user_id: UserId },
    Assistant,
    System,
}

/// Shape of the outbound message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    File,
}

/// Why a message did not pause the conversation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseSkip {
    NotHuman,
    AlreadyInactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseDecision {
    Pause(ConversationAiState),
    Skip(PauseSkip),
}

/// Decide whether a message pauses the assistant.
///
/// `kind` does not take part in the decision: text and file uploads pause
/// identically.
pub fn decide_pause(
    current: &ConversationAiState,
    sender: MessageSender,
    _kind: MessageKind,
    now: DateTime<Utc>,
    policy: PausePolicy,
) -> PauseDecision {
    let MessageSender::Human { user_id } = sender else {
        return PauseDecision::Skip(PauseSkip::NotHuman);
    };

    if !current.ai_active {
        return PauseDecision::Skip(PauseSkip::AlreadyInactive);
    }

    PauseDecision::Pause(current.paused_by(user_id, now, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistsync_core::{ConversationId, TenantId};
    use chrono::Duration;

    fn active() -> ConversationAiState {
        ConversationAiState::new(TenantId::new(9), ConversationId::new(42), true)
    }

    #[test]
    fn assistant_and_system_messages_never_pause() {
        let now = Utc::now();
        for sender in [MessageSender::Assistant, MessageSender::System] {
            assert_eq!(
                decide_pause(&active(), sender, MessageKind::Text, now, PausePolicy::default()),
                PauseDecision::Skip(PauseSkip::NotHuman)
            );
        }
    }

    #[test]
    fn inactive_conversation_is_left_alone() {
        let inactive = active().with_bulk_verdict(false);
        let sender = MessageSender::Human { user_id: UserId::new(5) };
        assert_eq!(
            decide_pause(&inactive, sender, MessageKind::File, Utc::now(), PausePolicy::default()),
            PauseDecision::Skip(PauseSkip::AlreadyInactive)
        );
    }

    #[test]
    fn text_and_file_pause_identically() {
        let sender = MessageSender::Human { user_id: UserId::new(5) };
        let now = Utc::now();
        let text = decide_pause(&active(), sender, MessageKind::Text, now, PausePolicy::default());
        let file = decide_pause(&active(), sender, MessageKind::File, now, PausePolicy::default());
        assert_eq!(text, file);

        let PauseDecision::Pause(state) = text else {
            panic!("expected pause");
        };
        assert_eq!(state.paused_until, Some(now + Duration::minutes(15)));
    }

    #[test]
    fn sender_serializes_as_tagged_union() {
        let json = serde_json::to_value(MessageSender::Human { user_id: UserId::new(5) }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "human", "user_id": 5}));
    }
}
