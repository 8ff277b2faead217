//! Wire shapes for the character chat service.
//!
//! The service (and older deployments of it) is loose about field names:
//! history entries come as `role`/`content` or `sender`/`text`, and history
//! may be a bare array or wrapped in an object. Everything is normalized here
//! into [`Message`] so the rest of the crate only sees one shape.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::core::message::{Message, Role};

// ============================================================================
// Requests
// ============================================================================

/// One prior turn sent as reply context.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for TranscriptEntry {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Body of `POST /chat/stream`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub document_id: String,
    pub character_id: String,
    pub message: String,
    pub conversation_history: Vec<TranscriptEntry>,
}

/// Body of `POST /chat/greeting`.
#[derive(Serialize, Debug)]
pub(crate) struct GreetingRequest<'a> {
    pub document_id: &'a str,
    pub character_id: &'a str,
}

/// Body of `POST /chat/session/save`.
#[derive(Serialize, Debug)]
pub(crate) struct SaveExchangeRequest<'a> {
    pub document_id: &'a str,
    pub character_id: &'a str,
    pub user_message: &'a str,
    pub assistant_message: &'a str,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Deserialize, Debug)]
pub(crate) struct GreetingResponse {
    #[serde(default)]
    pub greeting: String,
}

/// A history entry as the service sends it.
#[derive(Deserialize, Debug)]
pub(crate) struct WireMessage {
    #[serde(alias = "sender")]
    pub role: String,
    #[serde(alias = "text", default)]
    pub content: String,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub(crate) enum HistoryResponse {
    Bare(Vec<WireMessage>),
    Wrapped {
        #[serde(alias = "messages")]
        history: Vec<WireMessage>,
    },
}

impl HistoryResponse {
    /// Normalizes into completed messages, dropping entries with unknown roles.
    pub fn into_messages(self) -> Vec<Message> {
        let entries = match self {
            HistoryResponse::Bare(entries) => entries,
            HistoryResponse::Wrapped { history } => history,
        };
        entries
            .into_iter()
            .filter_map(|entry| match normalize_role(&entry.role) {
                Some(role) => Some(Message::new(role, entry.content)),
                None => {
                    warn!("Skipping history entry with unknown role: {:?}", entry.role);
                    None
                }
            })
            .collect()
    }
}

/// Maps the role spellings seen in stored history onto [`Role`].
pub(crate) fn normalize_role(raw: &str) -> Option<Role> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "user" | "human" => Some(Role::User),
        "assistant" | "character" | "bot" | "ai" => Some(Role::Assistant),
        _ => None,
    }
}

/// Summary of one stored conversation for a document.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub character_id: String,
    #[serde(default, alias = "name")]
    pub character_name: Option<String>,
    #[serde(default)]
    pub message_count: Option<usize>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub(crate) enum SessionListResponse {
    Bare(Vec<SessionSummary>),
    Wrapped { sessions: Vec<SessionSummary> },
}

impl SessionListResponse {
    pub fn into_sessions(self) -> Vec<SessionSummary> {
        match self {
            SessionListResponse::Bare(s) => s,
            SessionListResponse::Wrapped { sessions } => sessions,
        }
    }
}

/// FastAPI-style `{"detail": "..."}` error body.
#[derive(Deserialize, Debug)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Extracts a human-readable message from a failed response body.
pub(crate) fn error_message(status: u16, body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<ErrorBody>(body) {
        return match err.detail {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        trimmed.to_string()
    }
}
