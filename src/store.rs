//! Message store gateway: durable append and ordered retrieval, keyed by
//! room or by user pair. The trait is the seam between the dispatch engine
//! and Postgres; tests run the engine against an in-memory implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;

use crate::error::StoreError;
use crate::models::{MessageType, NewStoredMessage, StoredMessage};
use crate::schema::{messages, users};
use crate::utils::ids::{self, MessageIdGenerator};
use crate::DbPool;

/// A message as submitted for persistence. Id and timestamp are assigned by
/// the store, never by the client.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub content: String,
    pub sender: String,
    pub receiver: Option<String>,
    pub chat_room: Option<String>,
    pub message_type: MessageType,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message. Rejects with `UnknownSender`/`UnknownReceiver` when
    /// identity lookup fails; an unresolvable private message is rejected,
    /// never downgraded to public.
    async fn append(&self, draft: MessageDraft) -> Result<StoredMessage, StoreError>;

    /// Room history ascending by insertion order. `recent_limit` keeps only
    /// the newest N, still returned ascending.
    async fn room_history(
        &self,
        room: &str,
        recent_limit: Option<i64>,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// All messages between the pair, either direction, ascending.
    async fn private_history(&self, a: &str, b: &str) -> Result<Vec<StoredMessage>, StoreError>;

    /// Rewrite a message's content. The sender is re-checked against the
    /// fresh row at edit time.
    async fn edit(
        &self,
        message_id: i64,
        new_content: &str,
        requesting_username: &str,
    ) -> Result<StoredMessage, StoreError>;

    /// Remove a message. Returns the removed row so callers can notify
    /// subscribers about what disappeared.
    async fn delete(
        &self,
        message_id: i64,
        requesting_username: &str,
    ) -> Result<StoredMessage, StoreError>;
}

/// Diesel-backed store. Every call runs its blocking work on the tokio
/// blocking pool, bounded by a timeout; writes run inside an explicit
/// transaction so partial state never leaks on error paths.
pub struct PgMessageStore {
    pool: DbPool,
    id_gen: Arc<MessageIdGenerator>,
    timeout: Duration,
}

impl PgMessageStore {
    pub fn new(pool: DbPool, id_gen: Arc<MessageIdGenerator>, timeout: Duration) -> Self {
        Self {
            pool,
            id_gen,
            timeout,
        }
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| {
                tracing::error!("db pool checkout: {:?}", e);
                StoreError::Connection
            })?;
            op(&mut conn)
        });
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => {
                tracing::error!("store task panicked: {:?}", join);
                Err(StoreError::Internal)
            }
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

fn user_exists(conn: &mut PgConnection, username: &str) -> Result<bool, diesel::result::Error> {
    use crate::schema::users::dsl;
    diesel::select(diesel::dsl::exists(
        users::table.filter(dsl::username.eq(username)),
    ))
    .get_result(conn)
}

fn load_owned(
    conn: &mut PgConnection,
    message_id: i64,
    requesting_username: &str,
) -> Result<StoredMessage, StoreError> {
    use crate::schema::messages::dsl;
    let message: StoredMessage = messages::table
        .filter(dsl::id.eq(message_id))
        .select(StoredMessage::as_select())
        .first(conn)
        .optional()?
        .ok_or(StoreError::NotFound)?;
    if message.sender != requesting_username {
        return Err(StoreError::NotOwner);
    }
    Ok(message)
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, draft: MessageDraft) -> Result<StoredMessage, StoreError> {
        let id = ids::next_message_id(self.id_gen.as_ref()).await.map_err(|e| {
            tracing::error!("ferroid next_message_id: {:?}", e);
            StoreError::IdGeneration
        })?;

        self.run_blocking(move |conn| {
            conn.transaction(|conn| {
                if !user_exists(conn, &draft.sender)? {
                    return Err(StoreError::UnknownSender(draft.sender.clone()));
                }
                if let Some(receiver) = &draft.receiver {
                    if !user_exists(conn, receiver)? {
                        return Err(StoreError::UnknownReceiver(receiver.clone()));
                    }
                }
                let new_msg = NewStoredMessage {
                    id,
                    content: draft.content,
                    sender: draft.sender,
                    receiver: draft.receiver,
                    chat_room: draft.chat_room,
                    message_type: draft.message_type,
                    created_at: Utc::now(),
                    updated_at: None,
                };
                let stored = diesel::insert_into(messages::table)
                    .values(&new_msg)
                    .get_result::<StoredMessage>(conn)?;
                Ok(stored)
            })
        })
        .await
    }

    async fn room_history(
        &self,
        room: &str,
        recent_limit: Option<i64>,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let room = room.to_string();
        self.run_blocking(move |conn| {
            use crate::schema::messages::dsl;
            let base = messages::table
                .filter(dsl::chat_room.eq(&room))
                .filter(dsl::receiver.is_null())
                .select(StoredMessage::as_select());
            let rows = match recent_limit {
                None => base.order(dsl::id.asc()).load(conn)?,
                Some(limit) => {
                    let mut newest: Vec<StoredMessage> =
                        base.order(dsl::id.desc()).limit(limit.max(1)).load(conn)?;
                    newest.reverse();
                    newest
                }
            };
            Ok(rows)
        })
        .await
    }

    async fn private_history(&self, a: &str, b: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let (a, b) = (a.to_string(), b.to_string());
        self.run_blocking(move |conn| {
            use crate::schema::messages::dsl;
            let rows = messages::table
                .filter(
                    dsl::sender
                        .eq(&a)
                        .and(dsl::receiver.eq(&b))
                        .or(dsl::sender.eq(&b).and(dsl::receiver.eq(&a))),
                )
                .order(dsl::id.asc())
                .select(StoredMessage::as_select())
                .load(conn)?;
            Ok(rows)
        })
        .await
    }

    async fn edit(
        &self,
        message_id: i64,
        new_content: &str,
        requesting_username: &str,
    ) -> Result<StoredMessage, StoreError> {
        let new_content = new_content.to_string();
        let requesting = requesting_username.to_string();
        self.run_blocking(move |conn| {
            conn.transaction(|conn| {
                use crate::schema::messages::dsl;
                load_owned(conn, message_id, &requesting)?;
                let updated = diesel::update(messages::table.filter(dsl::id.eq(message_id)))
                    .set((
                        dsl::content.eq(&new_content),
                        dsl::updated_at.eq(Some(Utc::now())),
                    ))
                    .get_result::<StoredMessage>(conn)?;
                Ok(updated)
            })
        })
        .await
    }

    async fn delete(
        &self,
        message_id: i64,
        requesting_username: &str,
    ) -> Result<StoredMessage, StoreError> {
        let requesting = requesting_username.to_string();
        self.run_blocking(move |conn| {
            conn.transaction(|conn| {
                use crate::schema::messages::dsl;
                let message = load_owned(conn, message_id, &requesting)?;
                diesel::delete(messages::table.filter(dsl::id.eq(message_id))).execute(conn)?;
                Ok(message)
            })
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory store with the same contract as the Postgres one, used by
    //! the dispatch engine tests.

    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    pub struct MemoryStore {
        known_users: Vec<String>,
        messages: Mutex<Vec<StoredMessage>>,
        next_id: AtomicI64,
    }

    impl MemoryStore {
        pub fn with_users(known_users: &[&str]) -> Self {
            Self {
                known_users: known_users.iter().map(|u| u.to_string()).collect(),
                messages: Mutex::new(Vec::new()),
                next_id: AtomicI64::new(1),
            }
        }

        pub fn message_count(&self) -> usize {
            self.messages.lock().unwrap().len()
        }

        pub fn last_message(&self) -> Option<StoredMessage> {
            self.messages.lock().unwrap().last().cloned()
        }

        fn knows(&self, username: &str) -> bool {
            self.known_users.iter().any(|u| u == username)
        }
    }

    #[async_trait]
    impl MessageStore for MemoryStore {
        async fn append(&self, draft: MessageDraft) -> Result<StoredMessage, StoreError> {
            if !self.knows(&draft.sender) {
                return Err(StoreError::UnknownSender(draft.sender));
            }
            if let Some(receiver) = &draft.receiver {
                if !self.knows(receiver) {
                    return Err(StoreError::UnknownReceiver(receiver.clone()));
                }
            }
            let stored = StoredMessage {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                content: draft.content,
                sender: draft.sender,
                receiver: draft.receiver,
                chat_room: draft.chat_room,
                message_type: draft.message_type,
                created_at: Utc::now(),
                updated_at: None,
            };
            self.messages.lock().unwrap().push(stored.clone());
            Ok(stored)
        }

        async fn room_history(
            &self,
            room: &str,
            recent_limit: Option<i64>,
        ) -> Result<Vec<StoredMessage>, StoreError> {
            let mut rows: Vec<StoredMessage> = self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.chat_room.as_deref() == Some(room) && m.receiver.is_none())
                .cloned()
                .collect();
            if let Some(limit) = recent_limit {
                let keep = (limit.max(1)) as usize;
                if rows.len() > keep {
                    rows.drain(..rows.len() - keep);
                }
            }
            Ok(rows)
        }

        async fn private_history(
            &self,
            a: &str,
            b: &str,
        ) -> Result<Vec<StoredMessage>, StoreError> {
            Ok(self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| {
                    (m.sender == a && m.receiver.as_deref() == Some(b))
                        || (m.sender == b && m.receiver.as_deref() == Some(a))
                })
                .cloned()
                .collect())
        }

        async fn edit(
            &self,
            message_id: i64,
            new_content: &str,
            requesting_username: &str,
        ) -> Result<StoredMessage, StoreError> {
            let mut messages = self.messages.lock().unwrap();
            let message = messages
                .iter_mut()
                .find(|m| m.id == message_id)
                .ok_or(StoreError::NotFound)?;
            if message.sender != requesting_username {
                return Err(StoreError::NotOwner);
            }
            message.content = new_content.to_string();
            message.updated_at = Some(Utc::now());
            Ok(message.clone())
        }

        async fn delete(
            &self,
            message_id: i64,
            requesting_username: &str,
        ) -> Result<StoredMessage, StoreError> {
            let mut messages = self.messages.lock().unwrap();
            let idx = messages
                .iter()
                .position(|m| m.id == message_id)
                .ok_or(StoreError::NotFound)?;
            if messages[idx].sender != requesting_username {
                return Err(StoreError::NotOwner);
            }
            Ok(messages.remove(idx))
        }
    }

    #[tokio::test]
    async fn ordering_follows_insertion() {
        let store = MemoryStore::with_users(&["alice"]);
        for i in 0..3 {
            store
                .append(MessageDraft {
                    content: format!("msg {i}"),
                    sender: "alice".into(),
                    receiver: None,
                    chat_room: Some("public".into()),
                    message_type: MessageType::Chat,
                })
                .await
                .unwrap();
        }
        let history = store.room_history("public", None).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].id < w[1].id));
        assert!(history
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn edit_and_delete_enforce_ownership() {
        let store = MemoryStore::with_users(&["alice", "bob"]);
        let stored = store
            .append(MessageDraft {
                content: "original".into(),
                sender: "alice".into(),
                receiver: None,
                chat_room: Some("public".into()),
                message_type: MessageType::Chat,
            })
            .await
            .unwrap();

        let err = store.edit(stored.id, "hijacked", "bob").await.unwrap_err();
        assert!(matches!(err, StoreError::NotOwner));
        let err = store.delete(stored.id, "bob").await.unwrap_err();
        assert!(matches!(err, StoreError::NotOwner));
        // Unchanged after the rejected attempts.
        let history = store.room_history("public", None).await.unwrap();
        assert_eq!(history[0].content, "original");

        let edited = store.edit(stored.id, "fixed", "alice").await.unwrap();
        assert_eq!(edited.content, "fixed");
        assert!(edited.updated_at.is_some());
        store.delete(stored.id, "alice").await.unwrap();
        assert!(matches!(
            store.delete(stored.id, "alice").await.unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[tokio::test]
    async fn recent_limit_keeps_newest_ascending() {
        let store = MemoryStore::with_users(&["alice"]);
        for i in 0..5 {
            store
                .append(MessageDraft {
                    content: format!("msg {i}"),
                    sender: "alice".into(),
                    receiver: None,
                    chat_room: Some("public".into()),
                    message_type: MessageType::Chat,
                })
                .await
                .unwrap();
        }
        let recent = store.room_history("public", Some(2)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "msg 3");
        assert_eq!(recent[1].content, "msg 4");
    }
}
