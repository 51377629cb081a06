//! Wire protocol: tagged JSON payloads exchanged over the WebSocket, plus
//! the same message shape returned by the history endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MessageType, StoredMessage};

/// Server-to-client envelope: `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Message(MessagePayload),
    MessageUpdated(MessagePayload),
    MessageDeleted(MessagePayload),
    Presence(PresencePayload),
    System(SystemPayload),
    Pong,
}

impl ServerEvent {
    /// Serialize for the socket. Payloads are plain data; failure here would
    /// be a programming error, so fall back to a system notice.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"system","payload":{"content":"encode error"}}"#.into())
    }

    pub fn system(content: impl Into<String>) -> Self {
        ServerEvent::System(SystemPayload {
            content: content.into(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(with = "crate::serde_i64_string")]
    pub id: i64,
    pub content: String,
    pub sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_room: Option<String>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}

impl From<StoredMessage> for MessagePayload {
    fn from(m: StoredMessage) -> Self {
        MessagePayload {
            id: m.id,
            content: m.content,
            sender: m.sender,
            receiver: m.receiver,
            chat_room: m.chat_room,
            message_type: m.message_type,
            timestamp: m.created_at,
        }
    }
}

/// Roster update pushed when a user's presence flips.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub username: String,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemPayload {
    pub content: String,
}

/// Client-to-server frames. The sender is always the authenticated
/// connection's identity; it is never read from the frame.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
    Chat {
        content: String,
        #[serde(default)]
        receiver: Option<String>,
        #[serde(default, rename = "chatRoom")]
        chat_room: Option<String>,
    },
    Typing {
        #[serde(default)]
        receiver: Option<String>,
    },
}
