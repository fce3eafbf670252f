use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque backend-assigned chat identifier.
///
/// The client never inspects or generates these; they round-trip through
/// URLs and the chat listing verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl From<&str> for ChatId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Wire role string, intentionally decoupled from the client's message model.
///
/// The backend persists whatever roles its pipeline produces; only `user`
/// and `assistant` are recognized, everything else is treated as a
/// document-like record by the caller.
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

/// One persisted history entry as returned by the messages endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub message: String,
}

/// One row of the chat listing, consumed by the history-browsing surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: ChatId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Receipt for a completed document upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub filename: String,
    pub size_bytes: u64,
    pub chunk_count: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewChatResponse {
    pub chat_id: ChatId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatMessagesResponse {
    pub messages: Vec<StoredMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerResponse {
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    pub chunks: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatListResponse {
    pub chats: Vec<ChatSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_message_decodes_backend_shape() {
        let raw = r#"{"messages":[{"role":"user","message":"hi"},{"role":"document","message":"report.pdf"}]}"#;
        let decoded: ChatMessagesResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(decoded.messages.len(), 2);
        assert_eq!(decoded.messages[0].role, ROLE_USER);
        assert_eq!(decoded.messages[1].message, "report.pdf");
    }

    #[test]
    fn chat_summary_tolerates_missing_optional_fields() {
        let decoded: ChatListResponse = serde_json::from_str(r#"{"chats":[{"id":"abc"}]}"#).unwrap();

        assert_eq!(decoded.chats[0].id, ChatId::new("abc"));
        assert!(decoded.chats[0].title.is_empty());
    }

    #[test]
    fn chat_id_round_trips_as_transparent_string() {
        let id: ChatId = serde_json::from_str(r#""a1b2""#).unwrap();
        assert_eq!(id.to_string(), "a1b2");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""a1b2""#);
    }
}
