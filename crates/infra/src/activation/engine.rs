//! Activation rule engine service.
//!
//! Wraps the pure rules of `assistsync-activation` with the source-of-truth
//! stores, the cache and the fanout channel. Every mutation follows the same
//! order: write, invalidate affected cache domains, publish.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info};

use assistsync_activation::{
    ActivationVerdict, ChannelLinkConfig, ChannelRecord, ConversationAiState, PauseDecision, PausePolicy, PauseSkip,
    decide_pause, evaluate,
};
use assistsync_core::{ConversationId, TenantId};
use assistsync_events::{FanoutChannel, RealtimeEvent, RealtimeEventType, Room};

use crate::cache::{CacheDomain, CacheKeyBuilder, CacheService};
use crate::store::{
    ChannelDirectory, ConversationRecord, ConversationStateStore, MessageGateway, NewMessage, StoreError,
    StoredMessage,
};
use crate::tenant_context::TenantScope;

/// Domains whose cached reads depend on conversation AI state.
const CONVERSATION_DOMAINS: [CacheDomain; 3] = [CacheDomain::AiState, CacheDomain::Conversations, CacheDomain::Dashboard];

/// Result of a bulk rule application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleApplication {
    pub verdict: ActivationVerdict,
    /// Rows written (every conversation of the tenant).
    pub updated: u64,
}

/// What a message did to its conversation's assistant state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PauseOutcome {
    Paused { state: ConversationAiState },
    Unchanged { reason: PauseSkip },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub message: StoredMessage,
    pub pause: PauseOutcome,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToggleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Manual activation refused while the tenant-level verdict is off.
    #[error("assistant is disabled for the tenant ({})", .0.reason)]
    TenantInactive(ActivationVerdict),
}

pub struct ActivationRuleEngine {
    conversations: Arc<dyn ConversationStateStore>,
    channels: Arc<dyn ChannelDirectory>,
    messages: Arc<dyn MessageGateway>,
    cache: Arc<CacheService>,
    fanout: Arc<dyn FanoutChannel>,
    policy: PausePolicy,
}

impl ActivationRuleEngine {
    pub fn new(
        conversations: Arc<dyn ConversationStateStore>,
        channels: Arc<dyn ChannelDirectory>,
        messages: Arc<dyn MessageGateway>,
        cache: Arc<CacheService>,
        fanout: Arc<dyn FanoutChannel>,
    ) -> Self {
        Self {
            conversations,
            channels,
            messages,
            cache,
            fanout,
            policy: PausePolicy::default(),
        }
    }

    pub fn with_pause_policy(mut self, policy: PausePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn pause_policy(&self) -> PausePolicy {
        self.policy
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationStateStore> {
        &self.conversations
    }

    pub fn channels(&self) -> &Arc<dyn ChannelDirectory> {
        &self.channels
    }

    pub fn messages(&self) -> &Arc<dyn MessageGateway> {
        &self.messages
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.cache
    }

    /// Tenant-level verdict. Lookup failures resolve to inactive.
    pub async fn should_activate(&self, tenant_id: TenantId) -> ActivationVerdict {
        let config = match self.channels.link_config(tenant_id).await {
            Ok(config) => config,
            Err(e) => {
                error!(tenant_id = %tenant_id, error = %e, "link configuration lookup failed; assistant stays off");
                return ActivationVerdict::fail_closed();
            }
        };

        let linked = config
            .as_ref()
            .filter(|c| c.is_active)
            .and_then(|c| c.linked_channel_id.as_ref());

        let channel = match linked {
            Some(channel_id) => match self.channels.channel_record(tenant_id, channel_id).await {
                Ok(record) => record,
                Err(e) => {
                    error!(
                        tenant_id = %tenant_id,
                        channel_id = %channel_id,
                        error = %e,
                        "channel status lookup failed; assistant stays off"
                    );
                    return ActivationVerdict::fail_closed();
                }
            },
            None => None,
        };

        evaluate(config.as_ref(), channel.as_ref())
    }

    /// Re-derive the verdict and copy it onto every conversation of the tenant.
    ///
    /// Idempotent: unchanged configuration yields the same state and the same
    /// full-count result.
    pub async fn apply_rule_on_config_change(&self, tenant_id: TenantId) -> Result<RuleApplication, StoreError> {
        let verdict = self.should_activate(tenant_id).await;
        let updated = self
            .conversations
            .bulk_set_ai_active(tenant_id, verdict.active, Utc::now())
            .await?;

        info!(
            tenant_id = %tenant_id,
            active = verdict.active,
            reason = %verdict.reason,
            updated,
            "activation rule applied"
        );

        self.invalidate(tenant_id, &[CacheDomain::AiConfig, CacheDomain::AiState, CacheDomain::Conversations, CacheDomain::Dashboard])
            .await;

        let payload = json!({
            "ai_active": verdict.active,
            "reason": verdict.reason,
            "updated": updated,
        });
        self.fanout.publish(
            &Room::tenant(tenant_id),
            RealtimeEvent::tenant(RealtimeEventType::AiConfigChanged, tenant_id, payload),
        );
        self.fanout.publish(
            &Room::tenant(tenant_id),
            RealtimeEvent::tenant(
                RealtimeEventType::ConversationListUpdated,
                tenant_id,
                json!({ "reason": "ai_config_changed" }),
            ),
        );

        Ok(RuleApplication { verdict, updated })
    }

    /// Save the link configuration and re-apply the rule.
    pub async fn save_link_config(&self, config: ChannelLinkConfig) -> Result<RuleApplication, StoreError> {
        let tenant_id = config.tenant_id;
        self.channels.save_link_config(config).await?;
        self.apply_rule_on_config_change(tenant_id).await
    }

    /// Record live channel status and re-apply the rule.
    pub async fn record_channel_status(&self, record: ChannelRecord) -> Result<RuleApplication, StoreError> {
        let tenant_id = record.tenant_id;
        self.channels.save_channel_status(record).await?;
        self.apply_rule_on_config_change(tenant_id).await
    }

    /// Create a conversation whose state defaults to the current verdict.
    pub async fn create_conversation(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> Result<ConversationRecord, StoreError> {
        let verdict = self.should_activate(tenant_id).await;
        let record = self
            .conversations
            .create(ConversationAiState::new(tenant_id, conversation_id, verdict.active), Utc::now())
            .await?;

        self.invalidate(tenant_id, &CONVERSATION_DOMAINS).await;
        self.publish_list_updated(tenant_id, json!({ "conversation_id": conversation_id, "created": true }));
        Ok(record)
    }

    /// Cached read of one conversation's state (domain `ai_state`).
    pub async fn conversation_state(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> Result<Option<ConversationRecord>, StoreError> {
        let key = CacheKeyBuilder::build(tenant_id, CacheDomain::AiState, &[&conversation_id.to_string()]);
        let store = &self.conversations;

        TenantScope::run(tenant_id, async {
            self.cache
                .get_or_set(&key, CacheDomain::AiState, || store.get(tenant_id, conversation_id))
                .await
        })
        .await
    }

    /// Shared outbound-message path for text and file messages: create the
    /// message, apply the pause rule, invalidate, publish.
    pub async fn record_outbound_message(
        &self,
        message: NewMessage,
        now: DateTime<Utc>,
    ) -> Result<OutboundMessage, StoreError> {
        let (tenant_id, conversation_id) = (message.tenant_id, message.conversation_id);
        let current = self
            .conversations
            .get(tenant_id, conversation_id)
            .await?
            .ok_or(StoreError::NotFound)?;

        let stored = self.messages.create_message(message, now).await?;
        let pause = self.pause_on_message(&current.state, &stored, now).await?;

        let mut domains = vec![CacheDomain::Messages, CacheDomain::Conversations];
        if matches!(pause, PauseOutcome::Paused { .. }) {
            domains.extend([CacheDomain::AiState, CacheDomain::Dashboard]);
        }
        self.invalidate(tenant_id, &domains).await;

        let rooms = [Room::conversation(tenant_id, conversation_id), Room::tenant(tenant_id)];
        self.fanout.publish_to(
            &rooms,
            RealtimeEvent::conversation(
                RealtimeEventType::MessageNew,
                tenant_id,
                conversation_id,
                json!({ "message": &stored }),
            ),
        );
        if let PauseOutcome::Paused { state } = &pause {
            self.publish_list_updated(tenant_id, json!({ "conversation_id": conversation_id, "ai_state": state }));
        }

        Ok(OutboundMessage { message: stored, pause })
    }

    /// Pause hook. Non-human senders and already-inactive conversations are left alone.
    async fn pause_on_message(
        &self,
        current: &ConversationAiState,
        message: &StoredMessage,
        now: DateTime<Utc>,
    ) -> Result<PauseOutcome, StoreError> {
        match decide_pause(current, message.sender, message.kind(), now, self.policy) {
            PauseDecision::Pause(next) => {
                self.conversations.save_state(&next, now).await?;
                info!(
                    tenant_id = %next.tenant_id,
                    conversation_id = %next.conversation_id,
                    paused_until = ?next.paused_until,
                    "assistant paused by human message"
                );
                Ok(PauseOutcome::Paused { state: next })
            }
            PauseDecision::Skip(reason) => {
                debug!(conversation_id = %current.conversation_id, ?reason, "message did not pause assistant");
                Ok(PauseOutcome::Unchanged { reason })
            }
        }
    }

    /// Manual toggle from the UI. Clears pause fields; refuses to turn the
    /// assistant on while the tenant verdict is off.
    pub async fn set_ai_active(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        active: bool,
    ) -> Result<ConversationRecord, ToggleError> {
        if active {
            let verdict = self.should_activate(tenant_id).await;
            if !verdict.active {
                return Err(ToggleError::TenantInactive(verdict));
            }
        }

        let current = self
            .conversations
            .get(tenant_id, conversation_id)
            .await?
            .ok_or(StoreError::NotFound)?;
        let next = ConversationAiState {
            ai_active: active,
            ..current.state.cleared()
        };
        let record = self.conversations.save_state(&next, Utc::now()).await?;

        self.invalidate(tenant_id, &CONVERSATION_DOMAINS).await;
        self.fanout.publish_to(
            &[Room::conversation(tenant_id, conversation_id), Room::tenant(tenant_id)],
            RealtimeEvent::conversation(
                RealtimeEventType::ConversationListUpdated,
                tenant_id,
                conversation_id,
                json!({ "conversation_id": conversation_id, "ai_state": &record.state }),
            ),
        );
        Ok(record)
    }

    pub async fn archive_conversation(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> Result<ConversationRecord, StoreError> {
        let record = self
            .conversations
            .set_archived(tenant_id, conversation_id, true, Utc::now())
            .await?;

        self.invalidate(tenant_id, &CONVERSATION_DOMAINS).await;
        self.publish_list_updated(tenant_id, json!({ "conversation_id": conversation_id, "archived": true }));
        Ok(record)
    }

    /// Invalidate domains inside the tenant's scope. Never fails.
    pub(crate) async fn invalidate(&self, tenant_id: TenantId, domains: &[CacheDomain]) {
        TenantScope::run(tenant_id, async {
            for domain in domains {
                let _ = self.cache.invalidate_domain(*domain).await;
            }
        })
        .await;
    }

    pub(crate) fn fanout(&self) -> &Arc<dyn FanoutChannel> {
        &self.fanout
    }

    fn publish_list_updated(&self, tenant_id: TenantId, payload: serde_json::Value) {
        self.fanout.publish(
            &Room::tenant(tenant_id),
            RealtimeEvent::tenant(RealtimeEventType::ConversationListUpdated, tenant_id, payload),
        );
    }
}

impl core::fmt::Debug for ActivationRuleEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActivationRuleEngine")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
