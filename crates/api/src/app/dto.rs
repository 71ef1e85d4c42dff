//! Request/response bodies.

use serde::{Deserialize, Serialize};

use assistsync_activation::{ActivationVerdict, ChannelLinkConfig};
use assistsync_core::ConversationId;
use assistsync_infra::cache::{CacheDomain, CacheMetricsSnapshot, CachePolicy, CachePriority, CacheSkip};

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub conversation_id: ConversationId,
}

#[derive(Debug, Deserialize)]
pub struct SetAiActiveRequest {
    pub ai_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadFileRequest {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct LinkConfigRequest {
    pub linked_channel_id: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChannelStatusRequest {
    pub connected: bool,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    pub conversation_id: ConversationId,
}

#[derive(Debug, Serialize)]
pub struct AiConfigResponse {
    pub config: ChannelLinkConfig,
    pub verdict: ActivationVerdict,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub metrics: CacheMetricsSnapshot,
    pub available: bool,
    pub policies: Vec<PolicyView>,
}

#[derive(Debug, Serialize)]
pub struct PolicyView {
    pub domain: CacheDomain,
    pub ttl_seconds: u64,
    pub enabled: bool,
    pub priority: CachePriority,
}

impl From<&CachePolicy> for PolicyView {
    fn from(policy: &CachePolicy) -> Self {
        Self {
            domain: policy.domain,
            ttl_seconds: policy.ttl.as_secs(),
            enabled: policy.enabled,
            priority: policy.priority,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvalidationResponse {
    pub deleted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl InvalidationResponse {
    pub fn from_result(result: Result<u64, CacheSkip>) -> Self {
        match result {
            Ok(deleted) => Self { deleted, skipped: None },
            Err(reason) => Self {
                deleted: 0,
                skipped: Some(reason.to_string()),
            },
        }
    }
}
