//! In-memory source-of-truth stores for tests/dev.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use assistsync_activation::{ChannelLinkConfig, ChannelRecord, ConversationAiState};
use assistsync_core::{ChannelId, ConversationId, TenantId};

use super::{
    ChannelDirectory, ConversationRecord, ConversationStateStore, MessageGateway, NewMessage, StoreError,
    StoredMessage, classify_sender,
};

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    inner: RwLock<BTreeMap<(TenantId, ConversationId), ConversationRecord>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStateStore for InMemoryConversationStore {
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<ConversationRecord>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|(_, rec)| rec.clone())
            .collect())
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> Result<Option<ConversationRecord>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(&(tenant_id, conversation_id)).cloned())
    }

    async fn create(&self, state: ConversationAiState, now: DateTime<Utc>) -> Result<ConversationRecord, StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let key = (state.tenant_id, state.conversation_id);
        if map.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        let record = ConversationRecord::new(state, now);
        map.insert(key, record.clone());
        Ok(record)
    }

    async fn bulk_set_ai_active(
        &self,
        tenant_id: TenantId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let mut updated = 0;
        for ((t, _), rec) in map.iter_mut() {
            if *t == tenant_id {
                rec.state = rec.state.with_bulk_verdict(active);
                rec.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn save_state(
        &self,
        state: &ConversationAiState,
        now: DateTime<Utc>,
    ) -> Result<ConversationRecord, StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let rec = map
            .get_mut(&(state.tenant_id, state.conversation_id))
            .ok_or(StoreError::NotFound)?;
        rec.state = state.clone();
        rec.updated_at = now;
        Ok(rec.clone())
    }

    async fn set_archived(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        archived: bool,
        now: DateTime<Utc>,
    ) -> Result<ConversationRecord, StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let rec = map.get_mut(&(tenant_id, conversation_id)).ok_or(StoreError::NotFound)?;
        rec.archived = archived;
        rec.updated_at = now;
        Ok(rec.clone())
    }

    async fn find_expired_pauses(&self, now: DateTime<Utc>) -> Result<Vec<ConversationAiState>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map
            .values()
            .filter(|rec| rec.state.pause_expired(now))
            .map(|rec| rec.state.clone())
            .collect())
    }

    async fn resolve_expired_pause(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        reactivate: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<ConversationAiState>, StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let Some(rec) = map.get_mut(&(tenant_id, conversation_id)) else {
            return Ok(None);
        };
        if !rec.state.pause_expired(now) {
            return Ok(None);
        }

        rec.state = if reactivate {
            rec.state.reactivated()
        } else {
            rec.state.cleared()
        };
        rec.updated_at = now;
        Ok(Some(rec.state.clone()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryChannelDirectory {
    links: RwLock<HashMap<TenantId, ChannelLinkConfig>>,
    channels: RwLock<HashMap<(TenantId, ChannelId), ChannelRecord>>,
}

impl InMemoryChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChannelDirectory for InMemoryChannelDirectory {
    async fn link_config(&self, tenant_id: TenantId) -> Result<Option<ChannelLinkConfig>, StoreError> {
        let map = self.links.read().map_err(|_| poisoned())?;
        Ok(map.get(&tenant_id).cloned())
    }

    async fn save_link_config(&self, config: ChannelLinkConfig) -> Result<(), StoreError> {
        let mut map = self.links.write().map_err(|_| poisoned())?;
        map.insert(config.tenant_id, config);
        Ok(())
    }

    async fn channel_record(
        &self,
        tenant_id: TenantId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelRecord>, StoreError> {
        let map = self.channels.read().map_err(|_| poisoned())?;
        Ok(map.get(&(tenant_id, channel_id.clone())).cloned())
    }

    async fn save_channel_status(&self, record: ChannelRecord) -> Result<(), StoreError> {
        let mut map = self.channels.write().map_err(|_| poisoned())?;
        map.insert((record.tenant_id, record.channel_id.clone()), record);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryMessageGateway {
    messages: RwLock<Vec<StoredMessage>>,
}

impl InMemoryMessageGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageGateway for InMemoryMessageGateway {
    async fn create_message(&self, message: NewMessage, now: DateTime<Utc>) -> Result<StoredMessage, StoreError> {
        let stored = StoredMessage {
            message_id: Uuid::now_v7(),
            tenant_id: message.tenant_id,
            conversation_id: message.conversation_id,
            sender: classify_sender(message.user_id, message.automated),
            body: message.body,
            created_at: now,
        };
        let mut all = self.messages.write().map_err(|_| poisoned())?;
        all.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let all = self.messages.read().map_err(|_| poisoned())?;
        Ok(all
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}
