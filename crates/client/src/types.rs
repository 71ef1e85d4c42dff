//! Client-side state and optimistic action records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use assistsync_activation::ConversationAiState;
use assistsync_core::ConversationId;

/// What the client shows for one conversation.
///
/// Deserializes from the server's conversation row (`GET /conversations`,
/// `GET /conversations/{id}/ai-state`); unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationView {
    #[serde(flatten)]
    pub state: ConversationAiState,
    #[serde(default)]
    pub archived: bool,
}

impl ConversationView {
    pub fn new(state: ConversationAiState) -> Self {
        Self { state, archived: false }
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.state.conversation_id
    }
}

/// UI control an action belongs to. One action per affordance is in flight at a time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffordanceKind {
    AiToggle,
    Archive,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Affordance {
    pub conversation_id: ConversationId,
    pub kind: AffordanceKind,
}

/// A user mutation, each variant carrying exactly what it predicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    SetAiActive { conversation_id: ConversationId, ai_active: bool },
    ArchiveConversation { conversation_id: ConversationId },
}

impl ActionKind {
    pub fn conversation_id(&self) -> ConversationId {
        match self {
            ActionKind::SetAiActive { conversation_id, .. } | ActionKind::ArchiveConversation { conversation_id } => {
                *conversation_id
            }
        }
    }

    pub fn affordance(&self) -> Affordance {
        let kind = match self {
            ActionKind::SetAiActive { .. } => AffordanceKind::AiToggle,
            ActionKind::ArchiveConversation { .. } => AffordanceKind::Archive,
        };
        Affordance {
            conversation_id: self.conversation_id(),
            kind,
        }
    }

    /// Local prediction of the server's answer. Mirrors the server: a manual
    /// toggle clears pause fields.
    pub fn predict(&self, current: &ConversationView) -> ConversationView {
        match self {
            ActionKind::SetAiActive { ai_active, .. } => ConversationView {
                state: ConversationAiState {
                    ai_active: *ai_active,
                    ..current.state.cleared()
                },
                archived: current.archived,
            },
            ActionKind::ArchiveConversation { .. } => ConversationView {
                archived: true,
                ..current.clone()
            },
        }
    }

    /// Undo this action on `current`, taking back only the fields it owns from
    /// `snapshot`. Other actions in flight on the conversation keep their
    /// predictions.
    pub fn revert(&self, current: &ConversationView, snapshot: &ConversationView) -> ConversationView {
        match self {
            ActionKind::SetAiActive { .. } => ConversationView {
                state: snapshot.state.clone(),
                archived: current.archived,
            },
            ActionKind::ArchiveConversation { .. } => ConversationView {
                archived: snapshot.archived,
                ..current.clone()
            },
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Client-memory record of an optimistic action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAction {
    pub id: Uuid,
    pub kind: ActionKind,
    pub snapshot: ConversationView,
    pub predicted: ConversationView,
    pub submitted_at: DateTime<Utc>,
    pub status: ActionStatus,
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistsync_activation::PauseReason;
    use assistsync_core::{TenantId, UserId};

    fn paused_view() -> ConversationView {
        let mut state = ConversationAiState::new(TenantId::new(1), ConversationId::new(42), false);
        state.paused_until = Some(Utc::now());
        state.pause_reason = Some(PauseReason::ManualMessage);
        state.paused_by_user_id = Some(UserId::new(7));
        ConversationView::new(state)
    }

    #[test]
    fn toggling_on_predicts_cleared_pause_fields() {
        let view = paused_view();
        let predicted = ActionKind::SetAiActive {
            conversation_id: ConversationId::new(42),
            ai_active: true,
        }
        .predict(&view);

        assert!(predicted.state.ai_active);
        assert_eq!(predicted.state.pause_reason, None);
        assert_eq!(predicted.state.paused_until, None);
        assert!(!predicted.archived);
    }

    #[test]
    fn archive_only_touches_the_archived_flag() {
        let view = paused_view();
        let predicted = ActionKind::ArchiveConversation {
            conversation_id: ConversationId::new(42),
        }
        .predict(&view);

        assert!(predicted.archived);
        assert_eq!(predicted.state, view.state);
    }

    #[test]
    fn revert_only_takes_back_the_fields_the_action_owns() {
        let snapshot = paused_view();
        let toggle = ActionKind::SetAiActive {
            conversation_id: ConversationId::new(42),
            ai_active: true,
        };
        let archive = ActionKind::ArchiveConversation {
            conversation_id: ConversationId::new(42),
        };
        let both = archive.predict(&toggle.predict(&snapshot));

        let toggle_undone = toggle.revert(&both, &snapshot);
        assert_eq!(toggle_undone.state, snapshot.state);
        assert!(toggle_undone.archived);

        let archive_undone = archive.revert(&both, &snapshot);
        assert!(!archive_undone.archived);
        assert!(archive_undone.state.ai_active);
    }

    #[test]
    fn actions_on_one_conversation_use_separate_affordances() {
        let toggle = ActionKind::SetAiActive {
            conversation_id: ConversationId::new(1),
            ai_active: false,
        };
        let archive = ActionKind::ArchiveConversation {
            conversation_id: ConversationId::new(1),
        };
        assert_ne!(toggle.affordance(), archive.affordance());
        assert_eq!(toggle.affordance().conversation_id, archive.affordance().conversation_id);
    }

    #[test]
    fn view_reads_the_server_row_shape() {
        let row = serde_json::json!({
            "conversation_id": 42,
            "tenant_id": 1,
            "ai_active": true,
            "paused_until": null,
            "pause_reason": null,
            "paused_by_user_id": null,
            "archived": false,
            "updated_at": "2026-01-01T00:00:00Z"
        });
        let view: ConversationView = serde_json::from_value(row).unwrap();
        assert_eq!(view.conversation_id(), ConversationId::new(42));
        assert!(view.state.ai_active);
    }
}
