use crate::schema;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of a chat event. `Typing` is never persisted; it only exists on the
/// wire and is rejected by the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, diesel_derive_enum::DbEnum,
)]
#[ExistingTypePath = "crate::schema::sql_types::MessageType"]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Chat,
    Join,
    Leave,
    Typing,
}

impl MessageType {
    /// True for events that are written to history (everything but typing).
    pub fn is_persisted(self) -> bool {
        !matches!(self, MessageType::Typing)
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Insertable)]
#[diesel(table_name = schema::users)]
pub struct User {
    pub username: String,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::messages)]
pub struct StoredMessage {
    pub id: i64,
    pub content: String,
    pub sender: String,
    pub receiver: Option<String>,
    pub chat_room: Option<String>,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// For inserting a message. `id` comes from the snowflake generator and
/// `created_at` is server-assigned at append time, never taken from the client.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::messages)]
pub struct NewStoredMessage {
    pub id: i64,
    pub content: String,
    pub sender: String,
    pub receiver: Option<String>,
    pub chat_room: Option<String>,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}
