//! Connection registry: the in-memory index of live WebSocket connections.
//!
//! Three indices live behind one global lock: the active set (connection →
//! owning user + outbound sender), user → connections, and channel →
//! subscribers. Only this type mutates them.
//!
//! Delivery contract: the envelope is serialized once, the target set is
//! snapshotted under the lock, and every recipient is attempted; a failed
//! send never aborts delivery to the rest. Failed connections are
//! unregistered after the sweep, inside the same critical section, so no
//! concurrent broadcast can observe a half-removed connection.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use super::envelope::Envelope;

/// Opaque handle for one registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(u64);

struct ConnectionEntry {
    user_id: String,
    sender: UnboundedSender<Message>,
}

#[derive(Default)]
struct Indices {
    active: HashMap<ConnectionId, ConnectionEntry>,
    by_user: HashMap<String, HashSet<ConnectionId>>,
    by_channel: HashMap<String, HashSet<ConnectionId>>,
}

/// Registry statistics: total connections and per-channel subscriber
/// counts.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub channels: HashMap<String, usize>,
}

/// The connection registry.
pub struct ConnectionRegistry {
    inner: Mutex<Indices>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Indices::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register an authenticated connection. Returns its handle.
    pub fn register(&self, user_id: &str, sender: UnboundedSender<Message>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.lock().expect("registry lock poisoned");

        inner.active.insert(
            id,
            ConnectionEntry {
                user_id: user_id.to_string(),
                sender,
            },
        );
        inner
            .by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(id);

        info!(
            user_id = user_id,
            total = inner.active.len(),
            "WebSocket connected"
        );
        id
    }

    /// Remove a connection from every index. Idempotent: unregistering an
    /// unknown or already-removed handle is a no-op.
    pub fn unregister(&self, id: ConnectionId) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        Self::remove_locked(&mut inner, id);
    }

    fn remove_locked(inner: &mut Indices, id: ConnectionId) {
        let Some(entry) = inner.active.remove(&id) else {
            return;
        };

        if let Some(set) = inner.by_user.get_mut(&entry.user_id) {
            set.remove(&id);
            if set.is_empty() {
                inner.by_user.remove(&entry.user_id);
            }
        }

        inner.by_channel.retain(|_, set| {
            set.remove(&id);
            !set.is_empty()
        });

        info!(
            user_id = %entry.user_id,
            total = inner.active.len(),
            "WebSocket disconnected"
        );
    }

    /// Subscribe a connection to a channel. Unknown handles (already
    /// disconnected) are ignored.
    pub fn subscribe(&self, id: ConnectionId, channel: &str) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if !inner.active.contains_key(&id) {
            return;
        }
        inner
            .by_channel
            .entry(channel.to_string())
            .or_default()
            .insert(id);
        debug!(channel = channel, "Channel subscription added");
    }

    /// Unsubscribe a connection from a channel, pruning the channel entry
    /// if it empties.
    pub fn unsubscribe(&self, id: ConnectionId, channel: &str) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        if let Some(set) = inner.by_channel.get_mut(channel) {
            set.remove(&id);
            if set.is_empty() {
                inner.by_channel.remove(channel);
            }
        }
    }

    /// Send one envelope directly to one connection. Failures are healed
    /// like broadcast failures.
    pub fn send_to_connection(&self, id: ConnectionId, envelope: Envelope) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let Some(entry) = inner.active.get(&id) else {
            return;
        };
        let wire = envelope.to_json();
        if entry.sender.send(Message::Text(wire)).is_err() {
            Self::remove_locked(&mut inner, id);
        }
    }

    /// Deliver an envelope to every current subscriber of `channel`.
    /// Returns the number of successful deliveries.
    pub fn broadcast_to_channel(&self, channel: &str, envelope: Envelope) -> usize {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let targets: Vec<ConnectionId> = match inner.by_channel.get(channel) {
            Some(set) => set.iter().copied().collect(),
            None => return 0,
        };
        Self::deliver_locked(&mut inner, &targets, envelope)
    }

    /// Deliver an envelope to every connection owned by `user_id`. A user
    /// with no open connections is a silent no-op.
    pub fn send_to_user(&self, user_id: &str, envelope: Envelope) -> usize {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let targets: Vec<ConnectionId> = match inner.by_user.get(user_id) {
            Some(set) => set.iter().copied().collect(),
            None => return 0,
        };
        Self::deliver_locked(&mut inner, &targets, envelope)
    }

    /// Deliver an envelope to every active connection.
    pub fn broadcast_to_all(&self, envelope: Envelope) -> usize {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let targets: Vec<ConnectionId> = inner.active.keys().copied().collect();
        Self::deliver_locked(&mut inner, &targets, envelope)
    }

    // Serialize once, sweep the snapshot, then unregister the failures.
    // The failed set is collected first: removing while iterating the
    // snapshot would be fine for the Vec, but the indices must stay intact
    // until the sweep is done so every target gets its attempt.
    fn deliver_locked(inner: &mut Indices, targets: &[ConnectionId], envelope: Envelope) -> usize {
        let wire = envelope.to_json();

        let mut delivered = 0usize;
        let mut failed: Vec<ConnectionId> = Vec::new();
        for id in targets {
            let Some(entry) = inner.active.get(id) else {
                continue;
            };
            if entry.sender.send(Message::Text(wire.clone())).is_ok() {
                delivered += 1;
            } else {
                failed.push(*id);
            }
        }

        for id in failed {
            Self::remove_locked(inner, id);
        }
        delivered
    }

    /// Current connection and per-channel subscriber counts. Pure read.
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock().expect("registry lock poisoned");
        RegistryStats {
            total_connections: inner.active.len(),
            channels: inner
                .by_channel
                .iter()
                .map(|(name, set)| (name.clone(), set.len()))
                .collect(),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn connect(
        registry: &ConnectionRegistry,
        user: &str,
    ) -> (ConnectionId, UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (registry.register(user, tx), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }

    #[tokio::test]
    async fn test_unregister_removes_from_all_indices() {
        let registry = ConnectionRegistry::new();
        let (first, mut rx1) = connect(&registry, "alice");
        let (second, mut rx2) = connect(&registry, "alice");
        registry.subscribe(first, "air");
        registry.subscribe(second, "air");

        registry.unregister(first);

        let stats = registry.stats();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.channels.get("air"), Some(&1));

        // The sibling connection stays reachable via send_to_user.
        let delivered = registry.send_to_user("alice", Envelope::pong());
        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut rx2).len(), 1);
        assert!(drain(&mut rx1).is_empty());

        // Idempotent.
        registry.unregister(first);
        assert_eq!(registry.stats().total_connections, 1);
    }

    #[tokio::test]
    async fn test_unregister_prunes_empty_user_entry() {
        let registry = ConnectionRegistry::new();
        let (only, _rx) = connect(&registry, "alice");
        registry.unregister(only);

        assert_eq!(registry.send_to_user("alice", Envelope::pong()), 0);
        assert_eq!(registry.stats().total_connections, 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_subscribers() {
        let registry = ConnectionRegistry::new();
        let (sub, mut sub_rx) = connect(&registry, "alice");
        let (_other, mut other_rx) = connect(&registry, "bob");
        registry.subscribe(sub, "drones");

        let delivered = registry
            .broadcast_to_channel("drones", Envelope::telemetry_update("drones", json!({"b": 1})));
        assert_eq!(delivered, 1);

        let frames = drain(&mut sub_rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "telemetry_update");
        assert!(drain(&mut other_rx).is_empty());
    }

    #[tokio::test]
    async fn test_failed_recipient_does_not_block_others() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = connect(&registry, "alice");
        let (b, rx_b) = connect(&registry, "bob");
        let (c, mut rx_c) = connect(&registry, "carol");
        registry.subscribe(a, "air");
        registry.subscribe(b, "air");
        registry.subscribe(c, "air");

        // Simulate a dead transport.
        drop(rx_b);

        let delivered =
            registry.broadcast_to_channel("air", Envelope::telemetry_update("air", json!({})));
        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(drain(&mut rx_c).len(), 1);

        // The failed connection was unregistered during the sweep.
        let stats = registry.stats();
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.channels.get("air"), Some(&2));
        assert_eq!(registry.send_to_user("bob", Envelope::pong()), 0);
    }

    #[tokio::test]
    async fn test_send_to_offline_user_is_noop() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.send_to_user("nobody", Envelope::pong()), 0);
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = connect(&registry, "alice");
        let (b, _rx_b) = connect(&registry, "bob");
        let (c, _rx_c) = connect(&registry, "carol");
        registry.subscribe(a, "air");
        registry.subscribe(b, "air");
        registry.subscribe(c, "soil");

        let stats = registry.stats();
        assert_eq!(stats.total_connections, 3);
        assert_eq!(stats.channels.get("air"), Some(&2));
        assert_eq!(stats.channels.get("soil"), Some(&1));
    }

    #[tokio::test]
    async fn test_subscriber_added_after_broadcast_gets_next_one() {
        let registry = ConnectionRegistry::new();
        let (early, mut early_rx) = connect(&registry, "alice");
        registry.subscribe(early, "soil");

        registry.broadcast_to_channel("soil", Envelope::telemetry_update("soil", json!({"n": 1})));

        let (late, mut late_rx) = connect(&registry, "bob");
        registry.subscribe(late, "soil");

        registry.broadcast_to_channel("soil", Envelope::telemetry_update("soil", json!({"n": 2})));

        assert_eq!(drain(&mut early_rx).len(), 2);
        let late_frames = drain(&mut late_rx);
        assert_eq!(late_frames.len(), 1);
        assert_eq!(late_frames[0]["payload"]["n"], 2);
    }

    #[tokio::test]
    async fn test_broadcast_to_all() {
        let registry = ConnectionRegistry::new();
        let (_a, mut rx_a) = connect(&registry, "alice");
        let (_b, mut rx_b) = connect(&registry, "bob");

        let delivered = registry.broadcast_to_all(Envelope::alert("system", json!({"m": "hi"})));
        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_prunes_empty_channel() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = connect(&registry, "alice");
        registry.subscribe(id, "conveyor");
        assert_eq!(registry.stats().channels.get("conveyor"), Some(&1));

        registry.unsubscribe(id, "conveyor");
        assert!(registry.stats().channels.get("conveyor").is_none());
    }

    #[tokio::test]
    async fn test_subscribe_unknown_connection_ignored() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = connect(&registry, "alice");
        registry.unregister(id);
        registry.subscribe(id, "air");
        assert!(registry.stats().channels.is_empty());
    }
}
