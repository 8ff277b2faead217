//! # Gateways
//!
//! Stateless request/response wrappers around the chat service's session
//! and greeting endpoints. Every failure comes back as a [`ChatError`] value;
//! deciding what to do about it is the session controller's job.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::chat::error::ChatError;
use crate::chat::types::{
    GreetingRequest, GreetingResponse, HistoryResponse, SaveExchangeRequest, SessionListResponse,
    SessionSummary, error_message,
};
use crate::core::conversation::Conversation;
use crate::core::message::Message;

/// Stored exchange log per conversation.
#[async_trait]
pub trait HistoryGateway: Send + Sync {
    /// Stored messages, oldest first. Empty (not an error) when nothing is stored.
    async fn fetch_history(&self, conversation: &Conversation) -> Result<Vec<Message>, ChatError>;

    /// Persists one user/assistant exchange.
    async fn save_exchange(
        &self,
        conversation: &Conversation,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), ChatError>;

    /// Deletes the stored log for this conversation.
    async fn clear_history(&self, conversation: &Conversation) -> Result<(), ChatError>;

    /// Conversations stored for a document.
    async fn list_sessions(&self, document_id: &str) -> Result<Vec<SessionSummary>, ChatError>;
}

/// One-shot introductory message for a character.
#[async_trait]
pub trait GreetingGateway: Send + Sync {
    async fn fetch_greeting(&self, conversation: &Conversation) -> Result<String, ChatError>;
}

/// Both gateways over HTTP.
pub struct HttpGateway {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(base_url, reqwest::Client::new(), timeout)
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn conversation_query(conversation: &Conversation) -> [(&'static str, &str); 2] {
        [
            ("document_id", conversation.document_id.as_str()),
            ("character_id", conversation.character_id()),
        ]
    }

    /// Sends a request and rejects non-2xx responses with their `detail` message.
    async fn execute(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ChatError> {
        let response = builder.timeout(self.timeout).send().await?;
        let status = response.status();
        debug!("Gateway response status: {status}");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(status.as_u16(), &body);
        warn!("Gateway request failed: HTTP {} - {}", status.as_u16(), message);
        Err(ChatError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ChatError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ChatError::Parse(format!("{e}: {body}")))
    }
}

#[async_trait]
impl HistoryGateway for HttpGateway {
    async fn fetch_history(&self, conversation: &Conversation) -> Result<Vec<Message>, ChatError> {
        let request = self
            .client
            .get(self.url("/chat/session/history"))
            .query(&Self::conversation_query(conversation));

        let response = match self.execute(request).await {
            Ok(r) => r,
            Err(ChatError::Server { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                debug!("No stored history for {}", conversation.character_id());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let messages = Self::parse::<HistoryResponse>(response).await?.into_messages();
        info!(
            "Fetched {} history messages for {}/{}",
            messages.len(),
            conversation.document_id,
            conversation.character_id()
        );
        Ok(messages)
    }

    async fn save_exchange(
        &self,
        conversation: &Conversation,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), ChatError> {
        let body = SaveExchangeRequest {
            document_id: &conversation.document_id,
            character_id: conversation.character_id(),
            user_message: user_text,
            assistant_message: assistant_text,
        };
        let request = self.client.post(self.url("/chat/session/save")).json(&body);
        self.execute(request).await?;
        debug!("Saved exchange for {}", conversation.character_id());
        Ok(())
    }

    async fn clear_history(&self, conversation: &Conversation) -> Result<(), ChatError> {
        let request = self
            .client
            .delete(self.url("/chat/session/clear"))
            .query(&Self::conversation_query(conversation));
        self.execute(request).await?;
        info!(
            "Cleared history for {}/{}",
            conversation.document_id,
            conversation.character_id()
        );
        Ok(())
    }

    async fn list_sessions(&self, document_id: &str) -> Result<Vec<SessionSummary>, ChatError> {
        let request = self
            .client
            .get(self.url("/chat/session/list"))
            .query(&[("document_id", document_id)]);
        let response = self.execute(request).await?;
        Ok(Self::parse::<SessionListResponse>(response).await?.into_sessions())
    }
}

#[async_trait]
impl GreetingGateway for HttpGateway {
    async fn fetch_greeting(&self, conversation: &Conversation) -> Result<String, ChatError> {
        let body = GreetingRequest {
            document_id: &conversation.document_id,
            character_id: conversation.character_id(),
        };
        let request = self.client.post(self.url("/chat/greeting")).json(&body);
        let response = self.execute(request).await?;
        let greeting = Self::parse::<GreetingResponse>(response).await?.greeting;

        if greeting.trim().is_empty() {
            return Err(ChatError::Server {
                status: 200,
                message: "empty greeting".to_string(),
            });
        }
        Ok(greeting)
    }
}

/// Hides stored sessions whose character is on a denylist.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    hidden_characters: Vec<String>,
}

impl SessionFilter {
    pub fn new(hidden_characters: Vec<String>) -> Self {
        Self { hidden_characters }
    }

    /// True if the session should be shown. Matches id or name, case-insensitively.
    pub fn allows(&self, session: &SessionSummary) -> bool {
        let hidden = |candidate: &str| {
            self.hidden_characters
                .iter()
                .any(|h| h.eq_ignore_ascii_case(candidate.trim()))
        };
        !hidden(session.character_id.as_str())
            && !session.character_name.as_deref().is_some_and(hidden)
    }

    pub fn apply(&self, sessions: Vec<SessionSummary>) -> Vec<SessionSummary> {
        sessions.into_iter().filter(|s| self.allows(s)).collect()
    }
}
