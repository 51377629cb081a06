//! Identity store gateway: the read/write subset of user accounts the core
//! depends on (existence, presence flag, last-seen). Account management
//! beyond this lives outside the core.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::error::StoreError;
use crate::models::User;
use crate::schema::users;
use crate::DbPool;

/// The presence/identity operations the core depends on. Seam between the
/// lifecycle layer and Postgres; tests run against an in-memory
/// implementation.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn exists(&self, username: &str) -> Result<bool, StoreError>;

    /// Insert the username if it is not already known. Credential
    /// verification is the external credential service's business; the core
    /// only needs the row to exist for sender/receiver resolution.
    async fn ensure_user(&self, username: &str) -> Result<(), StoreError>;

    async fn set_online(&self, username: &str, is_online: bool) -> Result<(), StoreError>;

    async fn set_last_seen(&self, username: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn online_users(&self) -> Result<Vec<User>, StoreError>;
}

pub struct IdentityStore {
    pool: DbPool,
    timeout: Duration,
}

impl IdentityStore {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
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
                tracing::error!("identity task panicked: {:?}", join);
                Err(StoreError::Internal)
            }
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

#[async_trait]
impl PresenceStore for IdentityStore {
    async fn exists(&self, username: &str) -> Result<bool, StoreError> {
        let username = username.to_string();
        self.run_blocking(move |conn| {
            use crate::schema::users::dsl;
            let found: bool = diesel::select(diesel::dsl::exists(
                users::table.filter(dsl::username.eq(&username)),
            ))
            .get_result(conn)?;
            Ok(found)
        })
        .await
    }

    async fn ensure_user(&self, username: &str) -> Result<(), StoreError> {
        let username = username.to_string();
        self.run_blocking(move |conn| {
            use crate::schema::users::dsl;
            diesel::insert_into(users::table)
                .values((
                    dsl::username.eq(&username),
                    dsl::is_online.eq(false),
                    dsl::created_at.eq(Utc::now()),
                ))
                .on_conflict(dsl::username)
                .do_nothing()
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn set_online(&self, username: &str, is_online: bool) -> Result<(), StoreError> {
        let username = username.to_string();
        self.run_blocking(move |conn| {
            use crate::schema::users::dsl;
            diesel::update(users::table.filter(dsl::username.eq(&username)))
                .set(dsl::is_online.eq(is_online))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn set_last_seen(&self, username: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let username = username.to_string();
        self.run_blocking(move |conn| {
            use crate::schema::users::dsl;
            diesel::update(users::table.filter(dsl::username.eq(&username)))
                .set(dsl::last_seen.eq(Some(at)))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn online_users(&self) -> Result<Vec<User>, StoreError> {
        self.run_blocking(move |conn| {
            use crate::schema::users::dsl;
            let rows = users::table
                .filter(dsl::is_online.eq(true))
                .order(dsl::username.asc())
                .select(User::as_select())
                .load(conn)?;
            Ok(rows)
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory presence store with the same contract as the Postgres one,
    //! used by the lifecycle tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryPresence {
        users: Mutex<HashMap<String, User>>,
    }

    impl MemoryPresence {
        pub fn with_users(usernames: &[&str]) -> Self {
            let store = Self::default();
            {
                let mut users = store.users.lock().unwrap();
                for username in usernames {
                    users.insert(
                        username.to_string(),
                        User {
                            username: username.to_string(),
                            is_online: false,
                            last_seen: None,
                            created_at: Utc::now(),
                        },
                    );
                }
            }
            store
        }

        pub fn user(&self, username: &str) -> Option<User> {
            self.users.lock().unwrap().get(username).cloned()
        }
    }

    #[async_trait]
    impl PresenceStore for MemoryPresence {
        async fn exists(&self, username: &str) -> Result<bool, StoreError> {
            Ok(self.users.lock().unwrap().contains_key(username))
        }

        async fn ensure_user(&self, username: &str) -> Result<(), StoreError> {
            self.users
                .lock()
                .unwrap()
                .entry(username.to_string())
                .or_insert_with(|| User {
                    username: username.to_string(),
                    is_online: false,
                    last_seen: None,
                    created_at: Utc::now(),
                });
            Ok(())
        }

        async fn set_online(&self, username: &str, is_online: bool) -> Result<(), StoreError> {
            if let Some(user) = self.users.lock().unwrap().get_mut(username) {
                user.is_online = is_online;
            }
            Ok(())
        }

        async fn set_last_seen(
            &self,
            username: &str,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            if let Some(user) = self.users.lock().unwrap().get_mut(username) {
                user.last_seen = Some(at);
            }
            Ok(())
        }

        async fn online_users(&self) -> Result<Vec<User>, StoreError> {
            let mut rows: Vec<User> = self
                .users
                .lock()
                .unwrap()
                .values()
                .filter(|u| u.is_online)
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.username.cmp(&b.username));
            Ok(rows)
        }
    }
}
