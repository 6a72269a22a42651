//! Room registry - membership and ordered fan-out
//!
//! Rooms are ephemeral broadcast groups keyed by document id. Membership is
//! connection-lifetime-scoped: a connection joins when it requests a document
//! and is removed on disconnect. Fan-out runs over a single broadcast
//! channel, which makes the server the ordering authority: every subscriber
//! observes events in the exact order `publish` was called, per room
//! included. Recipients filter by room and sender; delivery to lagged or
//! disconnected receivers is dropped silently (at-most-once, best-effort).

use crate::delta::Delta;
use crate::document::DocumentId;
use dashmap::DashMap;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Transient identity of one live client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A change relayed to a room, unmodified from the sender's payload.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub document_id: DocumentId,
    pub sender: ConnectionId,
    pub delta: Delta,
}

/// Registry statistics
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub room_count: usize,
    pub member_count: usize,
    pub subscriber_count: usize,
}

/// Maps live connections to rooms and rooms to their member sets.
///
/// One room per connection is enforced: joining a second room moves the
/// connection out of the first.
pub struct RoomRegistry {
    /// Room membership: document id -> member connections
    rooms: DashMap<String, HashSet<ConnectionId>>,
    /// Reverse index: connection -> joined room
    joined: DashMap<ConnectionId, DocumentId>,
    /// Broadcast channel for relayed changes
    event_sender: broadcast::Sender<RoomEvent>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(10000);

        Self {
            rooms: DashMap::new(),
            joined: DashMap::new(),
            event_sender,
        }
    }

    /// Add a connection to the room for `document_id`.
    ///
    /// O(1). If the connection was in another room it leaves that room first.
    pub fn join(&self, connection: ConnectionId, document_id: DocumentId) {
        if let Some((_, previous)) = self.joined.remove(&connection) {
            if previous != document_id {
                self.remove_member(&previous, connection);
            }
        }

        self.rooms
            .entry(document_id.as_str().to_string())
            .or_default()
            .insert(connection);
        debug!(client = %connection, doc_id = %document_id, "Joined room");
        self.joined.insert(connection, document_id);
    }

    /// Remove a connection from whatever room it joined.
    ///
    /// Called on disconnect. Unknown connections are a no-op.
    pub fn leave(&self, connection: ConnectionId) {
        if let Some((_, document_id)) = self.joined.remove(&connection) {
            debug!(client = %connection, doc_id = %document_id, "Left room");
            self.remove_member(&document_id, connection);
        }
    }

    fn remove_member(&self, document_id: &DocumentId, connection: ConnectionId) {
        let emptied = match self.rooms.get_mut(document_id.as_str()) {
            Some(mut members) => {
                members.remove(&connection);
                members.is_empty()
            }
            None => false,
        };

        // Lazy reap: empty rooms are harmless but need not linger.
        if emptied {
            self.rooms
                .remove_if(document_id.as_str(), |_, members| members.is_empty());
        }
    }

    /// The room a connection currently belongs to, if any.
    pub fn room_of(&self, connection: ConnectionId) -> Option<DocumentId> {
        self.joined.get(&connection).map(|r| r.value().clone())
    }

    /// Current members of a room.
    pub fn members(&self, document_id: &DocumentId) -> Vec<ConnectionId> {
        self.rooms
            .get(document_id.as_str())
            .map(|r| r.value().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Publish a change to all subscribers, in receipt order.
    pub fn publish(&self, event: RoomEvent) {
        let _ = self.event_sender.send(event);
    }

    /// Subscribe to the relay event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.event_sender.subscribe()
    }

    /// Registry statistics
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            room_count: self.rooms.len(),
            member_count: self.joined.len(),
            subscriber_count: self.event_sender.receiver_count(),
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
