//! Subscription table: maps fan-out destinations to live connections.
//! Derived state only; rebuilt from registrations, never persisted.

use std::sync::Arc;

use crate::registry::ConnectionEntry;

/// Logical fan-out target: the shared public room, or one user's private
/// queue (which also carries that user's own sent private messages, so
/// their other devices see them).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    PublicRoom,
    PrivateQueue(String),
}

pub struct SubscriptionTable {
    inner: dashmap::DashMap<Destination, Vec<Arc<ConnectionEntry>>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self {
            inner: dashmap::DashMap::new(),
        }
    }

    pub fn subscribe(&self, destination: Destination, entry: Arc<ConnectionEntry>) {
        let mut vec = self.inner.entry(destination).or_default();
        if !vec.iter().any(|e| e.conn_id == entry.conn_id) {
            vec.push(entry);
        }
    }

    pub fn unsubscribe(&self, destination: &Destination, entry: &ConnectionEntry) {
        if let Some(mut vec) = self.inner.get_mut(destination) {
            vec.retain(|e| e.conn_id != entry.conn_id);
        }
        // Same shape as SessionRegistry::deregister: the emptiness check must
        // happen under the shard lock or a concurrent subscribe is wiped.
        self.inner.remove_if(destination, |_, vec| vec.is_empty());
    }

    /// Snapshot of the destination's subscribers. Safe under concurrent
    /// mutation; callers must tolerate an entry disconnecting before their
    /// push completes (best-effort delivery, not an error).
    pub fn resolve(&self, destination: &Destination) -> Vec<Arc<ConnectionEntry>> {
        self.inner
            .get(destination)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Implicit subscriptions for a freshly registered connection: the
    /// public room plus the owner's private queue.
    pub fn attach(&self, entry: &Arc<ConnectionEntry>) {
        self.subscribe(Destination::PublicRoom, entry.clone());
        self.subscribe(
            Destination::PrivateQueue(entry.username.clone()),
            entry.clone(),
        );
    }

    /// Reverse of `attach`. Idempotent.
    pub fn detach(&self, entry: &ConnectionEntry) {
        self.unsubscribe(&Destination::PublicRoom, entry);
        self.unsubscribe(&Destination::PrivateQueue(entry.username.clone()), entry);
    }
}

impl Default for SubscriptionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SessionRegistry;

    #[test]
    fn attach_derives_both_subscriptions() {
        let reg = SessionRegistry::new(8);
        let table = SubscriptionTable::new();
        let (entry, _rx, _) = reg.register("alice");
        table.attach(&entry);

        let public = table.resolve(&Destination::PublicRoom);
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].username, "alice");
        let queue = table.resolve(&Destination::PrivateQueue("alice".into()));
        assert_eq!(queue.len(), 1);
        assert!(table
            .resolve(&Destination::PrivateQueue("bob".into()))
            .is_empty());
    }

    #[test]
    fn detach_removes_both_and_is_idempotent() {
        let reg = SessionRegistry::new(8);
        let table = SubscriptionTable::new();
        let (entry, _rx, _) = reg.register("alice");
        table.attach(&entry);
        table.detach(&entry);
        table.detach(&entry);
        assert!(table.resolve(&Destination::PublicRoom).is_empty());
        assert!(table
            .resolve(&Destination::PrivateQueue("alice".into()))
            .is_empty());
    }

    #[test]
    fn attach_twice_keeps_one_subscription() {
        let reg = SessionRegistry::new(8);
        let table = SubscriptionTable::new();
        let (entry, _rx, _) = reg.register("alice");
        table.attach(&entry);
        table.attach(&entry);
        assert_eq!(table.resolve(&Destination::PublicRoom).len(), 1);
    }

    #[test]
    fn subscribe_racing_final_unsubscribe_is_never_lost() {
        let reg = SessionRegistry::new(8);
        let table = Arc::new(SubscriptionTable::new());
        for _ in 0..20_000 {
            let (old, _rx_old, _) = reg.register("alice");
            let (fresh, _rx_fresh, _) = reg.register("alice");
            table.subscribe(Destination::PublicRoom, old.clone());
            let table2 = table.clone();
            let old2 = old.clone();
            let racer =
                std::thread::spawn(move || table2.unsubscribe(&Destination::PublicRoom, &old2));
            table.subscribe(Destination::PublicRoom, fresh.clone());
            racer.join().unwrap();
            assert!(
                table
                    .resolve(&Destination::PublicRoom)
                    .iter()
                    .any(|e| e.conn_id == fresh.conn_id),
                "fresh subscription lost to racing unsubscribe"
            );
            table.unsubscribe(&Destination::PublicRoom, &fresh);
            reg.deregister(&old);
            reg.deregister(&fresh);
        }
    }

    #[test]
    fn resolve_is_a_snapshot() {
        let reg = SessionRegistry::new(8);
        let table = SubscriptionTable::new();
        let (entry, _rx, _) = reg.register("alice");
        table.attach(&entry);

        let snapshot = table.resolve(&Destination::PublicRoom);
        table.detach(&entry);
        // The earlier snapshot still holds the now-unsubscribed entry.
        assert_eq!(snapshot.len(), 1);
        assert!(table.resolve(&Destination::PublicRoom).is_empty());
    }
}
