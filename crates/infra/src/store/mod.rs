//! Source-of-truth store abstractions: conversation AI state, channel link
//! configuration, and message creation.
//!
//! Every method takes the tenant explicitly; implementations include it in
//! every lookup so cross-tenant access is impossible by construction.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use assistsync_activation::{ChannelLinkConfig, ChannelRecord, ConversationAiState, MessageKind, MessageSender};
use assistsync_core::{ChannelId, ConversationId, TenantId, UserId};

pub use memory::{InMemoryChannelDirectory, InMemoryConversationStore, InMemoryMessageGateway};
pub use postgres::PostgresStores;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("conversation not found")]
    NotFound,

    #[error("conversation already exists")]
    Conflict,

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Conversation row as persisted: AI state plus row metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(flatten)]
    pub state: ConversationAiState,
    pub archived: bool,
    /// Timestamp of the last mutation. Writes are last-write-wins.
    pub updated_at: DateTime<Utc>,
}

impl ConversationRecord {
    pub fn new(state: ConversationAiState, now: DateTime<Utc>) -> Self {
        Self {
            state,
            archived: false,
            updated_at: now,
        }
    }
}

#[async_trait]
pub trait ConversationStateStore: Send + Sync {
    /// All conversations of a tenant, ordered by id.
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<ConversationRecord>, StoreError>;

    async fn get(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> Result<Option<ConversationRecord>, StoreError>;

    /// Insert a new conversation. `Conflict` if the id is taken.
    async fn create(&self, state: ConversationAiState, now: DateTime<Utc>) -> Result<ConversationRecord, StoreError>;

    /// Set `ai_active` on every conversation of the tenant, clearing pause
    /// fields. Returns the number of rows written (all of them, not a diff).
    async fn bulk_set_ai_active(&self, tenant_id: TenantId, active: bool, now: DateTime<Utc>)
    -> Result<u64, StoreError>;

    /// Overwrite the AI fields of one conversation.
    async fn save_state(
        &self,
        state: &ConversationAiState,
        now: DateTime<Utc>,
    ) -> Result<ConversationRecord, StoreError>;

    async fn set_archived(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        archived: bool,
        now: DateTime<Utc>,
    ) -> Result<ConversationRecord, StoreError>;

    /// Conversations of every tenant whose pause has elapsed at `now`.
    async fn find_expired_pauses(&self, now: DateTime<Utc>) -> Result<Vec<ConversationAiState>, StoreError>;

    /// Resolve an elapsed pause, re-checking the expiry predicate at write time.
    ///
    /// `reactivate = true` sets `ai_active` and clears pause fields;
    /// `false` only clears pause fields. Returns `None` when the row no longer
    /// matches (already resolved, or paused again since it was read).
    async fn resolve_expired_pause(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        reactivate: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<ConversationAiState>, StoreError>;
}

#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn link_config(&self, tenant_id: TenantId) -> Result<Option<ChannelLinkConfig>, StoreError>;

    async fn save_link_config(&self, config: ChannelLinkConfig) -> Result<(), StoreError>;

    /// Live status record of a channel, scoped to the tenant.
    async fn channel_record(
        &self,
        tenant_id: TenantId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelRecord>, StoreError>;

    async fn save_channel_status(&self, record: ChannelRecord) -> Result<(), StoreError>;
}

/// Content of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    Text {
        text: String,
    },
    File {
        file_name: String,
        content_type: String,
        size_bytes: u64,
    },
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text { .. } => MessageKind::Text,
            MessageBody::File { .. } => MessageKind::File,
        }
    }
}

/// Message submitted for creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    /// Authenticated author, if the message comes from a user session.
    pub user_id: Option<UserId>,
    /// Set by the assistant pipeline for automated replies.
    pub automated: bool,
    pub body: MessageBody,
}

impl NewMessage {
    pub fn from_user(tenant_id: TenantId, conversation_id: ConversationId, user_id: UserId, body: MessageBody) -> Self {
        Self {
            tenant_id,
            conversation_id,
            user_id: Some(user_id),
            automated: false,
            body,
        }
    }
}

/// Sender classification: automated beats user, no user means system.
pub fn classify_sender(user_id: Option<UserId>, automated: bool) -> MessageSender {
    match (automated, user_id) {
        (true, _) => MessageSender::Assistant,
        (false, Some(user_id)) => MessageSender::Human { user_id },
        (false, None) => MessageSender::System,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message_id: Uuid,
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    pub sender: MessageSender,
    pub body: MessageBody,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }
}

/// Message-creation API of the messaging collaborator.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn create_message(&self, message: NewMessage, now: DateTime<Utc>) -> Result<StoredMessage, StoreError>;

    async fn list_messages(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> Result<Vec<StoredMessage>, StoreError>;
}

#[async_trait]
impl<S> ConversationStateStore for Arc<S>
where
    S: ConversationStateStore + ?Sized,
{
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<ConversationRecord>, StoreError> {
        (**self).list(tenant_id).await
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> Result<Option<ConversationRecord>, StoreError> {
        (**self).get(tenant_id, conversation_id).await
    }

    async fn create(&self, state: ConversationAiState, now: DateTime<Utc>) -> Result<ConversationRecord, StoreError> {
        (**self).create(state, now).await
    }

    async fn bulk_set_ai_active(
        &self,
        tenant_id: TenantId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        (**self).bulk_set_ai_active(tenant_id, active, now).await
    }

    async fn save_state(
        &self,
        state: &ConversationAiState,
        now: DateTime<Utc>,
    ) -> Result<ConversationRecord, StoreError> {
        (**self).save_state(state, now).await
    }

    async fn set_archived(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        archived: bool,
        now: DateTime<Utc>,
    ) -> Result<ConversationRecord, StoreError> {
        (**self).set_archived(tenant_id, conversation_id, archived, now).await
    }

    async fn find_expired_pauses(&self, now: DateTime<Utc>) -> Result<Vec<ConversationAiState>, StoreError> {
        (**self).find_expired_pauses(now).await
    }

    async fn resolve_expired_pause(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        reactivate: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<ConversationAiState>, StoreError> {
        (**self)
            .resolve_expired_pause(tenant_id, conversation_id, reactivate, now)
            .await
    }
}

#[async_trait]
impl<S> ChannelDirectory for Arc<S>
where
    S: ChannelDirectory + ?Sized,
{
    async fn link_config(&self, tenant_id: TenantId) -> Result<Option<ChannelLinkConfig>, StoreError> {
        (**self).link_config(tenant_id).await
    }

    async fn save_link_config(&self, config: ChannelLinkConfig) -> Result<(), StoreError> {
        (**self).save_link_config(config).await
    }

    async fn channel_record(
        &self,
        tenant_id: TenantId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelRecord>, StoreError> {
        (**self).channel_record(tenant_id, channel_id).await
    }

    async fn save_channel_status(&self, record: ChannelRecord) -> Result<(), StoreError> {
        (**self).save_channel_status(record).await
    }
}

#[async_trait]
impl<S> MessageGateway for Arc<S>
where
    S: MessageGateway + ?Sized,
{
    async fn create_message(&self, message: NewMessage, now: DateTime<Utc>) -> Result<StoredMessage, StoreError> {
        (**self).create_message(message, now).await
    }

    async fn list_messages(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        (**self).list_messages(tenant_id, conversation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_classification() {
        let u = UserId::new(5);
        assert_eq!(classify_sender(Some(u), false), MessageSender::Human { user_id: u });
        assert_eq!(classify_sender(Some(u), true), MessageSender::Assistant);
        assert_eq!(classify_sender(None, false), MessageSender::System);
    }

    #[test]
    fn record_flattens_state_on_the_wire() {
        let now = Utc::now();
        let rec = ConversationRecord::new(
            ConversationAiState::new(TenantId::new(9), ConversationId::new(42), true),
            now,
        );
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["conversation_id"], 42);
        assert_eq!(json["ai_active"], true);
        assert_eq!(json["archived"], false);
    }
}
