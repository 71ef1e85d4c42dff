//! The authoritative side of an optimistic action.

use async_trait::async_trait;
use thiserror::Error;

use assistsync_core::ConversationId;

use crate::sse::EventStream;
use crate::types::{ActionKind, ConversationView};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("client is offline")]
    Offline,
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({0}): {1}")]
    Api(u16, String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl TransportError {
    /// Errors that say nothing about the server's state.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, TransportError::Offline | TransportError::Network(_))
    }
}

#[async_trait]
pub trait ActionTransport: Send + Sync {
    /// Perform the action and return the server's resulting view.
    async fn submit(&self, action: &ActionKind) -> Result<ConversationView, TransportError>;

    async fn fetch_conversation(&self, conversation_id: ConversationId) -> Result<ConversationView, TransportError>;

    async fn fetch_conversations(&self) -> Result<Vec<ConversationView>, TransportError>;
}

/// HTTP transport against the API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    api_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_token(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::new(api_url)
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Check connectivity by hitting the health endpoint.
    pub async fn check_connectivity(&self) -> bool {
        let url = format!("{}/health", self.api_url);
        matches!(self.client.get(&url).send().await, Ok(resp) if resp.status().is_success())
    }

    /// Open the realtime stream, joining the given conversation rooms.
    pub async fn open_stream(&self, conversations: &[ConversationId]) -> Result<EventStream, TransportError> {
        let query: Vec<String> = conversations.iter().map(|c| format!("conversation={c}")).collect();
        let url = if query.is_empty() {
            format!("{}/realtime/stream", self.api_url)
        } else {
            format!("{}/realtime/stream?{}", self.api_url, query.join("&"))
        };

        let resp = self.authorized(self.client.get(&url)).send().await.map_err(network)?;
        let resp = ensure_success(resp).await?;
        Ok(EventStream::new(resp))
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn view(&self, req: reqwest::RequestBuilder) -> Result<ConversationView, TransportError> {
        let resp = self.authorized(req).send().await.map_err(network)?;
        let resp = ensure_success(resp).await?;
        resp.json().await.map_err(|e| TransportError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ActionTransport for HttpTransport {
    async fn submit(&self, action: &ActionKind) -> Result<ConversationView, TransportError> {
        match action {
            ActionKind::SetAiActive {
                conversation_id,
                ai_active,
            } => {
                let url = format!("{}/conversations/{}/ai-state", self.api_url, conversation_id);
                self.view(self.client.patch(&url).json(&serde_json::json!({ "ai_active": ai_active })))
                    .await
            }
            ActionKind::ArchiveConversation { conversation_id } => {
                let url = format!("{}/conversations/{}/archive", self.api_url, conversation_id);
                self.view(self.client.post(&url)).await
            }
        }
    }

    async fn fetch_conversation(&self, conversation_id: ConversationId) -> Result<ConversationView, TransportError> {
        let url = format!("{}/conversations/{}/ai-state", self.api_url, conversation_id);
        self.view(self.client.get(&url)).await
    }

    async fn fetch_conversations(&self) -> Result<Vec<ConversationView>, TransportError> {
        let url = format!("{}/conversations", self.api_url);
        let resp = self.authorized(self.client.get(&url)).send().await.map_err(network)?;
        let resp = ensure_success(resp).await?;
        resp.json().await.map_err(|e| TransportError::Parse(e.to_string()))
    }
}

fn network(e: reqwest::Error) -> TransportError {
    TransportError::Network(e.to_string())
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        let status = resp.status().as_u16();
        Err(TransportError::Api(status, resp.text().await.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_dropped_from_the_base_url() {
        let t = HttpTransport::with_token("http://localhost:8080/", "tok");
        assert_eq!(t.api_url(), "http://localhost:8080");
    }

    #[test]
    fn only_network_failures_count_as_connectivity() {
        assert!(TransportError::Offline.is_connectivity());
        assert!(TransportError::Network("reset".into()).is_connectivity());
        assert!(!TransportError::Api(409, "assistant_disabled".into()).is_connectivity());
    }
}
