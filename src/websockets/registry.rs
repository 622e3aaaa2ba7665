use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Identifier for one live connection
pub type ConnectionId = Uuid;

/// Snapshot handle to a live connection inside a room
///
/// The sender is an owned clone, so a snapshot stays valid after the
/// registry lock is released; sending to a connection that has since been
/// unregistered fails cleanly.
#[derive(Debug, Clone)]
pub struct RoomConnection {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub sender: mpsc::UnboundedSender<String>,
}

/// A user's live-connection status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Trait for tracking live WebSocket connections and their room
/// subscriptions
///
/// A connection belongs to at most one room at a time; subscribing again
/// replaces the previous subscription. The registry holds no history, only
/// what is live right now.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Adds a live connection with no room subscription yet
    async fn register(
        &self,
        user_id: String,
        sender: mpsc::UnboundedSender<String>,
    ) -> ConnectionId;

    /// Sets or replaces the connection's current room
    async fn subscribe(&self, connection_id: ConnectionId, room_id: &str);

    /// Clears the connection's current room
    async fn unsubscribe(&self, connection_id: ConnectionId);

    /// Removes the connection entirely; safe to call repeatedly and for
    /// connections that never subscribed
    async fn unregister(&self, connection_id: ConnectionId);

    /// Snapshot of the connections currently subscribed to a room
    async fn connections_in(&self, room_id: &str) -> Vec<RoomConnection>;

    /// The room the connection is currently subscribed to, if any
    async fn current_room(&self, connection_id: ConnectionId) -> Option<String>;

    /// Best-effort direct send to one connection
    async fn send_to(&self, connection_id: ConnectionId, message: &str);

    /// Live status for a user across all of their connections
    async fn user_presence(&self, user_id: &str) -> Presence;
}

struct ConnectionEntry {
    user_id: String,
    room_id: Option<String>,
    sender: mpsc::UnboundedSender<String>,
}

struct PresenceEntry {
    live_connections: usize,
    last_seen: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    // room_id -> subscribed connection ids, kept in lockstep with
    // `connections` so broadcasts never scan the whole map
    rooms: HashMap<String, HashSet<ConnectionId>>,
    presence: HashMap<String, PresenceEntry>,
}

impl RegistryInner {
    fn drop_from_room(&mut self, connection_id: ConnectionId, room_id: &str) {
        if let Some(members) = self.rooms.get_mut(room_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.rooms.remove(room_id);
            }
        }
    }
}

/// In-memory connection registry
///
/// All maps live behind a single lock, so registration, subscription moves
/// and snapshots never observe each other half-applied.
pub struct InMemoryConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl InMemoryConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }
}

impl Default for InMemoryConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryConnectionRegistry {
    async fn register(
        &self,
        user_id: String,
        sender: mpsc::UnboundedSender<String>,
    ) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        let mut inner = self.inner.write().await;

        let presence = inner
            .presence
            .entry(user_id.clone())
            .or_insert(PresenceEntry {
                live_connections: 0,
                last_seen: None,
            });
        presence.live_connections += 1;

        inner.connections.insert(
            connection_id,
            ConnectionEntry {
                user_id,
                room_id: None,
                sender,
            },
        );

        debug!(connection_id = %connection_id, "Connection registered");
        connection_id
    }

    async fn subscribe(&self, connection_id: ConnectionId, room_id: &str) {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let old_room = match inner.connections.get_mut(&connection_id) {
            Some(entry) => entry.room_id.replace(room_id.to_string()),
            None => {
                debug!(connection_id = %connection_id, "Subscribe for unknown connection ignored");
                return;
            }
        };

        if let Some(old_room) = old_room {
            inner.drop_from_room(connection_id, &old_room);
        }
        inner
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id);

        debug!(connection_id = %connection_id, room_id = %room_id, "Connection subscribed");
    }

    async fn unsubscribe(&self, connection_id: ConnectionId) {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let entry = match inner.connections.get_mut(&connection_id) {
            Some(entry) => entry,
            None => return,
        };

        if let Some(room_id) = entry.room_id.take() {
            inner.drop_from_room(connection_id, &room_id);
            debug!(connection_id = %connection_id, room_id = %room_id, "Connection unsubscribed");
        }
    }

    async fn unregister(&self, connection_id: ConnectionId) {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let entry = match inner.connections.remove(&connection_id) {
            Some(entry) => entry,
            // already gone; unregister is idempotent
            None => return,
        };

        if let Some(room_id) = &entry.room_id {
            inner.drop_from_room(connection_id, room_id);
        }

        if let Some(presence) = inner.presence.get_mut(&entry.user_id) {
            presence.live_connections = presence.live_connections.saturating_sub(1);
            if presence.live_connections == 0 {
                presence.last_seen = Some(Utc::now());
            }
        }

        debug!(connection_id = %connection_id, user_id = %entry.user_id, "Connection unregistered");
    }

    async fn connections_in(&self, room_id: &str) -> Vec<RoomConnection> {
        let inner = self.inner.read().await;
        match inner.rooms.get(room_id) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| {
                    inner.connections.get(id).map(|entry| RoomConnection {
                        connection_id: *id,
                        user_id: entry.user_id.clone(),
                        sender: entry.sender.clone(),
                    })
                })
                .collect(),
            None => Vec::new(),
        }
    }

    async fn current_room(&self, connection_id: ConnectionId) -> Option<String> {
        let inner = self.inner.read().await;
        inner
            .connections
            .get(&connection_id)
            .and_then(|entry| entry.room_id.clone())
    }

    async fn send_to(&self, connection_id: ConnectionId, message: &str) {
        let inner = self.inner.read().await;
        if let Some(entry) = inner.connections.get(&connection_id) {
            let _ = entry.sender.send(message.to_string());
        }
    }

    async fn user_presence(&self, user_id: &str) -> Presence {
        let inner = self.inner.read().await;
        match inner.presence.get(user_id) {
            Some(entry) => Presence {
                online: entry.live_connections > 0,
                last_seen: entry.last_seen,
            },
            None => Presence {
                online: false,
                last_seen: None,
            },
        }
    }
}
