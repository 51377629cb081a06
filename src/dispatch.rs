//! Dispatch engine: validate, persist, resolve destinations, fan out.
//! Stages are strictly ordered; nothing is fanned out unless persistence
//! succeeded (typing indicators skip persistence entirely).

use std::sync::Arc;

use crate::error::DispatchError;
use crate::metrics::Metrics;
use crate::models::MessageType;
use crate::protocol::{MessagePayload, ServerEvent};
use crate::registry::ConnectionEntry;
use crate::store::{MessageDraft, MessageStore};
use crate::subscriptions::{Destination, SubscriptionTable};

/// One inbound event from a live connection (or synthesized by the
/// lifecycle layer for join/leave). The sender is the authenticated
/// identity of the submitting connection.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub sender: String,
    pub content: String,
    pub receiver: Option<String>,
    pub chat_room: Option<String>,
    pub message_type: MessageType,
}

impl InboundEvent {
    pub fn chat(
        sender: &str,
        content: String,
        receiver: Option<String>,
        chat_room: Option<String>,
    ) -> Self {
        // Null room on a public message means the shared public room.
        let chat_room = if receiver.is_some() {
            None
        } else {
            Some(chat_room.unwrap_or_else(|| "public".to_string()))
        };
        Self {
            sender: sender.to_string(),
            content,
            receiver,
            chat_room,
            message_type: MessageType::Chat,
        }
    }

    pub fn typing(sender: &str, receiver: Option<String>) -> Self {
        Self {
            sender: sender.to_string(),
            content: String::new(),
            receiver,
            chat_room: None,
            message_type: MessageType::Typing,
        }
    }

    pub fn joined(username: &str) -> Self {
        Self {
            sender: username.to_string(),
            content: format!("{username} joined the chat!"),
            receiver: None,
            chat_room: Some("public".to_string()),
            message_type: MessageType::Join,
        }
    }

    pub fn left(username: &str) -> Self {
        Self {
            sender: username.to_string(),
            content: format!("{username} left the chat!"),
            receiver: None,
            chat_room: Some("public".to_string()),
            message_type: MessageType::Leave,
        }
    }
}

pub struct DispatchEngine {
    subscriptions: Arc<SubscriptionTable>,
    store: Arc<dyn MessageStore>,
    metrics: Arc<Metrics>,
    max_message_len: usize,
}

impl DispatchEngine {
    pub fn new(
        subscriptions: Arc<SubscriptionTable>,
        store: Arc<dyn MessageStore>,
        metrics: Arc<Metrics>,
        max_message_len: usize,
    ) -> Self {
        Self {
            subscriptions,
            store,
            metrics,
            max_message_len,
        }
    }

    /// Process one inbound event through the staged pipeline. Returns the
    /// persisted payload, or `None` for ephemeral typing indicators.
    /// Errors mean nothing was fanned out; per-connection push failures are
    /// not errors.
    pub async fn submit(
        &self,
        event: InboundEvent,
    ) -> Result<Option<MessagePayload>, DispatchError> {
        if event.message_type == MessageType::Chat {
            if event.content.trim().is_empty() {
                return Err(DispatchError::InvalidMessage("empty content"));
            }
            if event.content.chars().count() > self.max_message_len {
                return Err(DispatchError::InvalidMessage("content too long"));
            }
        }

        if !event.message_type.is_persisted() {
            let payload = MessagePayload {
                id: 0,
                content: String::new(),
                sender: event.sender.clone(),
                receiver: event.receiver.clone(),
                chat_room: event.chat_room.clone(),
                message_type: MessageType::Typing,
                timestamp: chrono::Utc::now(),
            };
            let targets = self.resolve(&event.sender, event.receiver.as_deref());
            self.fan_out(&targets, &ServerEvent::Message(payload).to_frame());
            return Ok(None);
        }

        let stored = self
            .store
            .append(MessageDraft {
                content: event.content,
                sender: event.sender,
                receiver: event.receiver,
                chat_room: event.chat_room,
                message_type: event.message_type,
            })
            .await?;
        self.metrics.messages_dispatched.inc();

        let payload = MessagePayload::from(stored);
        let targets = self.resolve(&payload.sender, payload.receiver.as_deref());
        self.fan_out(&targets, &ServerEvent::Message(payload.clone()).to_frame());
        Ok(Some(payload))
    }

    /// Push a server event to every live subscriber of a message's
    /// destinations. Used for edit/delete notifications.
    pub fn notify(&self, sender: &str, receiver: Option<&str>, event: &ServerEvent) {
        let targets = self.resolve(sender, receiver);
        self.fan_out(&targets, &event.to_frame());
    }

    /// Public events go to the public room; private events go to the
    /// sender's and receiver's queues, so the sender's other devices see
    /// their own sent messages too.
    fn resolve(&self, sender: &str, receiver: Option<&str>) -> Vec<Arc<ConnectionEntry>> {
        match receiver {
            None => self.subscriptions.resolve(&Destination::PublicRoom),
            Some(receiver) => {
                let mut targets = self
                    .subscriptions
                    .resolve(&Destination::PrivateQueue(sender.to_string()));
                for entry in self
                    .subscriptions
                    .resolve(&Destination::PrivateQueue(receiver.to_string()))
                {
                    if !targets.iter().any(|e| e.conn_id == entry.conn_id) {
                        targets.push(entry);
                    }
                }
                targets
            }
        }
    }

    /// Fire-and-forget push to each connection in the snapshot. A full send
    /// buffer drops that connection's copy and flags it for forced
    /// disconnect; it never blocks or aborts the other pushes.
    fn fan_out(&self, targets: &[Arc<ConnectionEntry>], frame: &str) {
        for entry in targets {
            self.metrics.fanout_pushes.inc();
            if !entry.push(frame) {
                self.metrics.fanout_drops.inc();
                tracing::debug!(
                    username = %entry.username,
                    conn_id = entry.conn_id,
                    "send buffer full, forcing disconnect"
                );
                entry.shutdown.notify_one();
            }
        }
    }
}
