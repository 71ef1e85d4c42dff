//! Postgres-backed source-of-truth stores.
//!
//! Tables are described in `sql/schema.sql`. Every statement filters on
//! `tenant_id` except the expiry scan, which is a cross-tenant maintenance
//! query by nature.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use assistsync_activation::{ChannelLinkConfig, ChannelRecord, ConversationAiState, MessageSender, PauseReason};
use assistsync_core::{ChannelId, ConversationId, TenantId, UserId};

use super::{
    ChannelDirectory, ConversationRecord, ConversationStateStore, MessageBody, MessageGateway, NewMessage,
    StoreError, StoredMessage, classify_sender,
};

const CONVERSATION_COLUMNS: &str =
    "tenant_id, conversation_id, ai_active, paused_until, pause_reason, paused_by_user_id, archived, updated_at";

/// All three source-of-truth stores over one connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStores {
    pool: Arc<PgPool>,
}

impl PostgresStores {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(backend)?;
        Ok(Self::new(pool))
    }
}

fn backend(e: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn state_from_row(row: &PgRow) -> Result<ConversationAiState, StoreError> {
    let reason: Option<String> = row.try_get("pause_reason").map_err(backend)?;
    let pause_reason = match reason {
        Some(r) => Some(PauseReason::parse(&r).ok_or_else(|| backend(format!("unknown pause_reason {r:?}")))?),
        None => None,
    };

    Ok(ConversationAiState {
        tenant_id: TenantId::new(row.try_get("tenant_id").map_err(backend)?),
        conversation_id: ConversationId::new(row.try_get("conversation_id").map_err(backend)?),
        ai_active: row.try_get("ai_active").map_err(backend)?,
        paused_until: row.try_get("paused_until").map_err(backend)?,
        pause_reason,
        paused_by_user_id: row
            .try_get::<Option<i64>, _>("paused_by_user_id")
            .map_err(backend)?
            .map(UserId::new),
    })
}

fn record_from_row(row: &PgRow) -> Result<ConversationRecord, StoreError> {
    Ok(ConversationRecord {
        state: state_from_row(row)?,
        archived: row.try_get("archived").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

#[async_trait]
impl ConversationStateStore for PostgresStores {
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<ConversationRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE tenant_id = $1 ORDER BY conversation_id"
        ))
        .bind(tenant_id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> Result<Option<ConversationRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE tenant_id = $1 AND conversation_id = $2"
        ))
        .bind(tenant_id.get())
        .bind(conversation_id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn create(&self, state: ConversationAiState, now: DateTime<Utc>) -> Result<ConversationRecord, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO conversations (
                tenant_id, conversation_id, ai_active, paused_until, pause_reason, paused_by_user_id, archived, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(state.tenant_id.get())
        .bind(state.conversation_id.get())
        .bind(state.ai_active)
        .bind(state.paused_until)
        .bind(state.pause_reason.map(|r| r.as_str()))
        .bind(state.paused_by_user_id.map(|u| u.get()))
        .bind(now)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| if is_unique_violation(&e) { StoreError::Conflict } else { backend(e) })?;

        record_from_row(&row)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn bulk_set_ai_active(
        &self,
        tenant_id: TenantId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET ai_active = $2,
                paused_until = NULL,
                pause_reason = NULL,
                paused_by_user_id = NULL,
                updated_at = $3
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id.get())
        .bind(active)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected())
    }

    async fn save_state(
        &self,
        state: &ConversationAiState,
        now: DateTime<Utc>,
    ) -> Result<ConversationRecord, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE conversations
            SET ai_active = $3,
                paused_until = $4,
                pause_reason = $5,
                paused_by_user_id = $6,
                updated_at = $7
            WHERE tenant_id = $1 AND conversation_id = $2
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(state.tenant_id.get())
        .bind(state.conversation_id.get())
        .bind(state.ai_active)
        .bind(state.paused_until)
        .bind(state.pause_reason.map(|r| r.as_str()))
        .bind(state.paused_by_user_id.map(|u| u.get()))
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(record_from_row).transpose()?.ok_or(StoreError::NotFound)
    }

    async fn set_archived(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        archived: bool,
        now: DateTime<Utc>,
    ) -> Result<ConversationRecord, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE conversations
            SET archived = $3, updated_at = $4
            WHERE tenant_id = $1 AND conversation_id = $2
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(tenant_id.get())
        .bind(conversation_id.get())
        .bind(archived)
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(record_from_row).transpose()?.ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self))]
    async fn find_expired_pauses(&self, now: DateTime<Utc>) -> Result<Vec<ConversationAiState>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE ai_active = FALSE
              AND pause_reason IS NOT NULL
              AND paused_until <= $1
            ORDER BY tenant_id, conversation_id
            "#
        ))
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(state_from_row).collect()
    }

    async fn resolve_expired_pause(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        reactivate: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<ConversationAiState>, StoreError> {
        // The WHERE clause repeats the expiry predicate so overlapping sweeps and
        // fresh pauses are never clobbered.
        let row = sqlx::query(&format!(
            r#"
            UPDATE conversations
            SET ai_active = $3,
                paused_until = NULL,
                pause_reason = NULL,
                paused_by_user_id = NULL,
                updated_at = $4
            WHERE tenant_id = $1
              AND conversation_id = $2
              AND ai_active = FALSE
              AND pause_reason IS NOT NULL
              AND paused_until <= $4
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(tenant_id.get())
        .bind(conversation_id.get())
        .bind(reactivate)
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(state_from_row).transpose()
    }
}

#[async_trait]
impl ChannelDirectory for PostgresStores {
    async fn link_config(&self, tenant_id: TenantId) -> Result<Option<ChannelLinkConfig>, StoreError> {
        let row = sqlx::query("SELECT linked_channel_id, is_active FROM channel_links WHERE tenant_id = $1")
            .bind(tenant_id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let linked: Option<String> = row.try_get("linked_channel_id").map_err(backend)?;
        Ok(Some(ChannelLinkConfig {
            tenant_id,
            linked_channel_id: linked.and_then(ChannelId::parse),
            is_active: row.try_get("is_active").map_err(backend)?,
        }))
    }

    async fn save_link_config(&self, config: ChannelLinkConfig) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO channel_links (tenant_id, linked_channel_id, is_active)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id)
            DO UPDATE SET linked_channel_id = EXCLUDED.linked_channel_id, is_active = EXCLUDED.is_active
            "#,
        )
        .bind(config.tenant_id.get())
        .bind(config.linked_channel_id.as_ref().map(|c| c.as_str().to_string()))
        .bind(config.is_active)
        .execute(&*self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn channel_record(
        &self,
        tenant_id: TenantId,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelRecord>, StoreError> {
        let row = sqlx::query("SELECT connected, deleted FROM channels WHERE tenant_id = $1 AND channel_id = $2")
            .bind(tenant_id.get())
            .bind(channel_id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(backend)?;

        row.map(|row| {
            Ok(ChannelRecord {
                channel_id: channel_id.clone(),
                tenant_id,
                connected: row.try_get("connected").map_err(backend)?,
                deleted: row.try_get("deleted").map_err(backend)?,
            })
        })
        .transpose()
    }

    async fn save_channel_status(&self, record: ChannelRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO channels (tenant_id, channel_id, connected, deleted)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, channel_id)
            DO UPDATE SET connected = EXCLUDED.connected, deleted = EXCLUDED.deleted
            "#,
        )
        .bind(record.tenant_id.get())
        .bind(record.channel_id.as_str())
        .bind(record.connected)
        .bind(record.deleted)
        .execute(&*self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl MessageGateway for PostgresStores {
    async fn create_message(&self, message: NewMessage, now: DateTime<Utc>) -> Result<StoredMessage, StoreError> {
        let stored = StoredMessage {
            message_id: Uuid::now_v7(),
            tenant_id: message.tenant_id,
            conversation_id: message.conversation_id,
            sender: classify_sender(message.user_id, message.automated),
            body: message.body,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO messages (message_id, tenant_id, conversation_id, sender, body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(stored.message_id)
        .bind(stored.tenant_id.get())
        .bind(stored.conversation_id.get())
        .bind(serde_json::to_value(stored.sender).map_err(backend)?)
        .bind(serde_json::to_value(&stored.body).map_err(backend)?)
        .bind(stored.created_at)
        .execute(&*self.pool)
        .await
        .map_err(backend)?;

        Ok(stored)
    }

    async fn list_messages(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT message_id, sender, body, created_at
            FROM messages
            WHERE tenant_id = $1 AND conversation_id = $2
            ORDER BY created_at, message_id
            "#,
        )
        .bind(tenant_id.get())
        .bind(conversation_id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(backend)?;

        rows.iter()
            .map(|row| {
                let sender: serde_json::Value = row.try_get("sender").map_err(backend)?;
                let body: serde_json::Value = row.try_get("body").map_err(backend)?;
                Ok(StoredMessage {
                    message_id: row.try_get("message_id").map_err(backend)?,
                    tenant_id,
                    conversation_id,
                    sender: serde_json::from_value::<MessageSender>(sender).map_err(backend)?,
                    body: serde_json::from_value::<MessageBody>(body).map_err(backend)?,
                    created_at: row.try_get("created_at").map_err(backend)?,
                })
            })
            .collect()
    }
}
