//! Session registry: maps a username to its live connections, tracks
//! presence transitions, and finds stale connections for forced disconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Notify};

/// Per-connection state. The `tx` end feeds the socket writer task; pushes go
/// through `try_send` so a stalled consumer can never block a dispatcher.
#[derive(Debug)]
pub struct ConnectionEntry {
    pub conn_id: u64,
    pub username: String,
    pub tx: mpsc::Sender<String>,
    /// Unix timestamp (seconds) when the connection was registered.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last inbound frame from the client.
    pub last_activity_at: AtomicU64,
    /// Signalled to force the owning socket task to close (stall, timeout).
    pub shutdown: Notify,
}

impl ConnectionEntry {
    pub fn touch(&self) {
        self.last_activity_at.store(now_secs(), Ordering::Relaxed);
    }

    /// Best-effort push of a serialized frame. Returns false if the send
    /// buffer was full; the caller decides whether that forces a disconnect.
    pub fn push(&self, frame: &str) -> bool {
        match self.tx.try_send(frame.to_string()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => false,
            // Receiver gone: the socket is already tearing down.
            Err(mpsc::error::TrySendError::Closed(_)) => true,
        }
    }
}

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(0);

fn next_conn_id() -> u64 {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Presence transition observed by a register/deregister call. The lifecycle
/// layer turns these into identity-store writes and roster broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    CameOnline,
    WentOffline,
    Unchanged,
}

/// Registry of live connections per username. Thread-safe; shared via Arc.
/// Mutations for one username serialize on that key's dashmap shard lock.
pub struct SessionRegistry {
    inner: dashmap::DashMap<String, Vec<Arc<ConnectionEntry>>>,
    send_buffer: usize,
}

impl SessionRegistry {
    pub fn new(send_buffer: usize) -> Self {
        Self {
            inner: dashmap::DashMap::new(),
            send_buffer,
        }
    }

    /// Register a new connection for the given username. Returns the entry,
    /// the receiver for the socket writer task, and whether this flipped the
    /// user online. Caller must call `deregister` when the socket closes.
    pub fn register(
        &self,
        username: &str,
    ) -> (Arc<ConnectionEntry>, mpsc::Receiver<String>, PresenceChange) {
        let conn_id = next_conn_id();
        let (tx, rx) = mpsc::channel(self.send_buffer);
        let now = now_secs();
        let entry = Arc::new(ConnectionEntry {
            conn_id,
            username: username.to_string(),
            tx,
            created_at: now,
            last_activity_at: AtomicU64::new(now),
            shutdown: Notify::new(),
        });
        let mut vec = self.inner.entry(username.to_string()).or_default();
        let change = if vec.is_empty() {
            PresenceChange::CameOnline
        } else {
            PresenceChange::Unchanged
        };
        vec.push(entry.clone());
        drop(vec);
        (entry, rx, change)
    }

    /// Remove a single connection. Idempotent: removing an unknown or
    /// already-removed connection reports `Unchanged` and never fails, so
    /// disconnect races cannot crash the dispatcher.
    pub fn deregister(&self, entry: &ConnectionEntry) -> PresenceChange {
        let mut change = PresenceChange::Unchanged;
        if let Some(mut vec) = self.inner.get_mut(&entry.username) {
            let before = vec.len();
            vec.retain(|e| e.conn_id != entry.conn_id);
            if vec.len() < before && vec.is_empty() {
                change = PresenceChange::WentOffline;
            }
        }
        // Re-checks emptiness under the shard lock: a register landing after
        // the guard above dropped must not be wiped by this removal.
        self.inner.remove_if(&entry.username, |_, vec| vec.is_empty());
        change
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.inner
            .get(username)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    /// Snapshot of the user's live connections.
    pub fn live_connections(&self, username: &str) -> Vec<Arc<ConnectionEntry>> {
        self.inner
            .get(username)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Total live connections across all users.
    pub fn connection_count(&self) -> usize {
        self.inner.iter().map(|e| e.len()).sum()
    }

    /// Connections with no inbound frame for more than `max_age_secs`.
    /// Entries are returned, not removed: the caller signals each entry's
    /// shutdown handle so teardown runs on the owning socket task and the
    /// normal deregistration path (presence, leave event) applies.
    pub fn stale_connections(&self, max_age_secs: u64) -> Vec<Arc<ConnectionEntry>> {
        let now = now_secs();
        let mut stale = Vec::new();
        for ref_entry in self.inner.iter() {
            for e in ref_entry.iter() {
                let age = now.saturating_sub(e.last_activity_at.load(Ordering::Relaxed));
                if age > max_age_secs {
                    stale.push(e.clone());
                }
            }
        }
        stale
    }
}
