//! Connection handler - the per-connection protocol state machine
//!
//! One handler per live connection. It owns the connection's `SessionState`
//! and mediates between the wire, the room registry, and the document store:
//!
//! - `get-document` (once): find-or-create, join room, reply `load-document`
//! - `send-changes`: validated, then relayed unmodified to room peers
//! - `save-document`: validated, then persisted; fire-and-forget
//!
//! Every failure resolves to a log line and at most an `error` event on this
//! connection; nothing here can take down another room or connection.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use codoc_core::{ConnectionId, DocumentId, RoomEvent, RoomRegistry, SessionState};
use codoc_protocol::{ClientMessage, ServerMessage};
use codoc_storage::DocumentStore;

use crate::DEFAULT_STORE_TIMEOUT_MS;

/// Handles a single client connection
pub struct ConnectionHandler {
    /// Transient identity of this connection
    pub connection_id: ConnectionId,
    /// Room registry reference
    registry: Arc<RoomRegistry>,
    /// Document persistence
    store: Arc<dyn DocumentStore>,
    /// Protocol state of this connection
    state: SessionState,
    /// Time budget for store lookups
    store_timeout: Duration,
}

impl ConnectionHandler {
    pub fn new(registry: Arc<RoomRegistry>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            connection_id: ConnectionId::new(),
            registry,
            store,
            state: SessionState::AwaitingDocument,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }

    /// Override the store lookup time budget.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Handle one inbound message, returning the replies to unicast back.
    pub async fn handle_message(&mut self, msg: ClientMessage) -> Vec<ServerMessage> {
        debug!(client = %self.connection_id, event = msg.event_name(), "Processing message");

        match msg {
            ClientMessage::GetDocument { document_id } => self.handle_get_document(document_id).await,
            ClientMessage::SendChanges { delta } => self.handle_send_changes(delta),
            ClientMessage::SaveDocument { delta } => self.handle_save_document(delta).await,
        }
    }

    async fn handle_get_document(&mut self, document_id: String) -> Vec<ServerMessage> {
        if self.state.is_active() {
            warn!(client = %self.connection_id, "get-document on an already active connection");
            return vec![ServerMessage::error(
                "ALREADY_JOINED",
                "This connection already joined a document",
            )];
        }

        let id = match DocumentId::new(document_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(client = %self.connection_id, error = %e, "Rejected document request");
                return vec![ServerMessage::error("INVALID_ID", e.to_string())];
            }
        };

        // The lookup is bounded so a dead backend fails the request instead
        // of leaving the client stuck on its loading gate.
        let document =
            match tokio::time::timeout(self.store_timeout, self.store.find_or_create(&id)).await {
                Ok(Ok(document)) => document,
                Ok(Err(e)) => {
                    warn!(client = %self.connection_id, doc_id = %id, error = %e, "Store lookup failed");
                    return vec![ServerMessage::error(
                        "STORE_UNAVAILABLE",
                        "Document could not be loaded",
                    )];
                }
                Err(_) => {
                    warn!(client = %self.connection_id, doc_id = %id, "Store lookup timed out");
                    return vec![ServerMessage::error(
                        "STORE_UNAVAILABLE",
                        "Document could not be loaded",
                    )];
                }
            };

        info!(client = %self.connection_id, doc_id = %id, "Document loaded");
        self.registry.join(self.connection_id, id.clone());
        self.state = SessionState::Active { document_id: id };

        vec![ServerMessage::load_document(document.data)]
    }

    fn handle_send_changes(&mut self, delta: codoc_core::Delta) -> Vec<ServerMessage> {
        let Some(document_id) = self.state.document_id() else {
            warn!(client = %self.connection_id, "send-changes before get-document, dropped");
            return Vec::new();
        };

        if let Err(e) = delta.ensure_well_formed() {
            warn!(client = %self.connection_id, doc_id = %document_id, error = %e, "Rejected changes");
            return Vec::new();
        }

        // Pass-through relay: the delta is forwarded exactly as received.
        self.registry.publish(RoomEvent {
            document_id: document_id.clone(),
            sender: self.connection_id,
            delta,
        });

        Vec::new()
    }

    async fn handle_save_document(&mut self, delta: codoc_core::Delta) -> Vec<ServerMessage> {
        let Some(document_id) = self.state.document_id().cloned() else {
            warn!(client = %self.connection_id, "save-document before get-document, dropped");
            return Vec::new();
        };

        if let Err(e) = delta.ensure_well_formed() {
            warn!(client = %self.connection_id, doc_id = %document_id, error = %e, "Rejected snapshot");
            return Vec::new();
        }

        // Fire-and-forget: no acknowledgment either way.
        if let Err(e) = self.store.save(&document_id, &delta).await {
            warn!(client = %self.connection_id, doc_id = %document_id, error = %e, "Failed to persist snapshot");
        } else {
            debug!(client = %self.connection_id, doc_id = %document_id, "Snapshot persisted");
        }

        Vec::new()
    }

    /// Whether a relayed event should be delivered to this connection:
    /// same room, different sender.
    pub fn wants(&self, event: &RoomEvent) -> bool {
        event.sender != self.connection_id
            && self.state.document_id() == Some(&event.document_id)
    }

    /// Subscribe to the relay event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RoomEvent> {
        self.registry.subscribe()
    }

    /// Clean up when the connection closes.
    pub fn cleanup(&self) {
        self.registry.leave(self.connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codoc_core::Delta;
    use codoc_storage::{MemoryStore, StoreError, StoreStats};

    fn setup() -> (Arc<RoomRegistry>, Arc<MemoryStore>) {
        (Arc::new(RoomRegistry::new()), Arc::new(MemoryStore::new()))
    }

    fn handler(
        registry: &Arc<RoomRegistry>,
        store: &Arc<MemoryStore>,
    ) -> ConnectionHandler {
        ConnectionHandler::new(registry.clone(), store.clone())
    }

    #[tokio::test]
    async fn test_get_document_on_empty_store() {
        let (registry, store) = setup();
        let mut h = handler(&registry, &store);

        let replies = h
            .handle_message(ClientMessage::get_document("doc1"))
            .await;

        assert_eq!(replies, vec![ServerMessage::load_document(Delta::empty())]);
        assert!(h.state().is_active());
        assert_eq!(registry.members(&DocumentId::new("doc1").unwrap()).len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_id_surfaces_error() {
        let (registry, store) = setup();
        let mut h = handler(&registry, &store);

        let replies = h.handle_message(ClientMessage::get_document("")).await;

        assert!(matches!(
            replies.as_slice(),
            [ServerMessage::Error { code, .. }] if code == "INVALID_ID"
        ));
        assert!(!h.state().is_active());
        assert_eq!(registry.stats().member_count, 0);
    }

    #[tokio::test]
    async fn test_second_get_document_rejected() {
        let (registry, store) = setup();
        let mut h = handler(&registry, &store);

        h.handle_message(ClientMessage::get_document("doc1")).await;
        let replies = h.handle_message(ClientMessage::get_document("doc2")).await;

        assert!(matches!(
            replies.as_slice(),
            [ServerMessage::Error { code, .. }] if code == "ALREADY_JOINED"
        ));
        assert_eq!(
            h.state().document_id(),
            Some(&DocumentId::new("doc1").unwrap())
        );
    }

    #[tokio::test]
    async fn test_changes_relayed_to_room_not_sender() {
        let (registry, store) = setup();
        let mut alice = handler(&registry, &store);
        let mut bob = handler(&registry, &store);
        let mut carol = handler(&registry, &store);

        alice.handle_message(ClientMessage::get_document("doc1")).await;
        bob.handle_message(ClientMessage::get_document("doc1")).await;
        carol.handle_message(ClientMessage::get_document("other")).await;

        let mut events = registry.subscribe();
        let replies = alice
            .handle_message(ClientMessage::send_changes(Delta::insert("hi")))
            .await;
        assert!(replies.is_empty());

        let event = events.recv().await.unwrap();
        assert_eq!(event.delta, Delta::insert("hi"));
        assert!(!alice.wants(&event), "sender must not receive its own change");
        assert!(bob.wants(&event));
        assert!(!carol.wants(&event), "other rooms must not receive the change");
    }

    #[tokio::test]
    async fn test_changes_before_join_dropped() {
        let (registry, store) = setup();
        let mut h = handler(&registry, &store);
        let mut events = registry.subscribe();

        let replies = h
            .handle_message(ClientMessage::send_changes(Delta::insert("early")))
            .await;

        assert!(replies.is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_delta_dropped() {
        let (registry, store) = setup();
        let mut h = handler(&registry, &store);
        h.handle_message(ClientMessage::get_document("doc1")).await;

        let mut events = registry.subscribe();
        let bad = Delta::new(serde_json::json!([1, 2, 3]));
        h.handle_message(ClientMessage::send_changes(bad.clone())).await;
        h.handle_message(ClientMessage::save_document(bad)).await;

        assert!(events.try_recv().is_err());
        let id = DocumentId::new("doc1").unwrap();
        let stored = store.load(&id).await.unwrap().unwrap();
        assert!(stored.data.is_empty(), "malformed snapshot must not persist");
    }

    #[tokio::test]
    async fn test_save_then_late_join_loads_snapshot() {
        let (registry, store) = setup();
        let mut alice = handler(&registry, &store);
        alice.handle_message(ClientMessage::get_document("doc1")).await;

        // Changes relayed before the save are not part of durable state.
        alice
            .handle_message(ClientMessage::send_changes(Delta::insert("hi")))
            .await;
        alice
            .handle_message(ClientMessage::save_document(Delta::new(
                serde_json::json!("hi"),
            )))
            .await;

        let mut late = handler(&registry, &store);
        let replies = late.handle_message(ClientMessage::get_document("doc1")).await;

        assert_eq!(
            replies,
            vec![ServerMessage::load_document(Delta::new(serde_json::json!(
                "hi"
            )))],
            "late joiner gets the persisted snapshot, not edit history"
        );
    }

    #[tokio::test]
    async fn test_cleanup_removes_from_room() {
        let (registry, store) = setup();
        let mut alice = handler(&registry, &store);
        let mut bob = handler(&registry, &store);

        alice.handle_message(ClientMessage::get_document("doc1")).await;
        bob.handle_message(ClientMessage::get_document("doc1")).await;

        bob.cleanup();
        let id = DocumentId::new("doc1").unwrap();
        assert_eq!(registry.members(&id), vec![alice.connection_id]);

        // In-flight broadcasts to the remaining member still work.
        let mut events = registry.subscribe();
        alice
            .handle_message(ClientMessage::send_changes(Delta::insert("still here")))
            .await;
        assert!(events.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_store_failure_yields_error_event() {
        struct FailingStore;

        #[async_trait::async_trait]
        impl DocumentStore for FailingStore {
            async fn find_or_create(
                &self,
                _id: &DocumentId,
            ) -> Result<codoc_core::Document, StoreError> {
                Err(StoreError::Connection("backend down".into()))
            }
            async fn save(&self, _id: &DocumentId, _data: &Delta) -> Result<(), StoreError> {
                Err(StoreError::Connection("backend down".into()))
            }
            async fn load(
                &self,
                _id: &DocumentId,
            ) -> Result<Option<codoc_core::Document>, StoreError> {
                Err(StoreError::Connection("backend down".into()))
            }
            async fn exists(&self, _id: &DocumentId) -> Result<bool, StoreError> {
                Err(StoreError::Connection("backend down".into()))
            }
            async fn stats(&self) -> Result<StoreStats, StoreError> {
                Err(StoreError::Connection("backend down".into()))
            }
        }

        let registry = Arc::new(RoomRegistry::new());
        let mut h = ConnectionHandler::new(registry.clone(), Arc::new(FailingStore));

        let replies = h.handle_message(ClientMessage::get_document("doc1")).await;
        assert!(matches!(
            replies.as_slice(),
            [ServerMessage::Error { code, .. }] if code == "STORE_UNAVAILABLE"
        ));
        assert!(!h.state().is_active());
    }

    #[tokio::test]
    async fn test_store_timeout_yields_error_event() {
        struct HangingStore;

        #[async_trait::async_trait]
        impl DocumentStore for HangingStore {
            async fn find_or_create(
                &self,
                id: &DocumentId,
            ) -> Result<codoc_core::Document, StoreError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(codoc_core::Document::new(id.clone()))
            }
            async fn save(&self, _id: &DocumentId, _data: &Delta) -> Result<(), StoreError> {
                Ok(())
            }
            async fn load(
                &self,
                _id: &DocumentId,
            ) -> Result<Option<codoc_core::Document>, StoreError> {
                Ok(None)
            }
            async fn exists(&self, _id: &DocumentId) -> Result<bool, StoreError> {
                Ok(false)
            }
            async fn stats(&self) -> Result<StoreStats, StoreError> {
                Ok(StoreStats::default())
            }
        }

        let registry = Arc::new(RoomRegistry::new());
        let mut h = ConnectionHandler::new(registry.clone(), Arc::new(HangingStore))
            .with_store_timeout(Duration::from_millis(10));

        let replies = h.handle_message(ClientMessage::get_document("doc1")).await;
        assert!(matches!(
            replies.as_slice(),
            [ServerMessage::Error { code, .. }] if code == "STORE_UNAVAILABLE"
        ));
    }
}
