//! Client-to-server messages

use codoc_core::Delta;
use serde::{Deserialize, Serialize};

/// A message sent by a client.
///
/// `get-document` is issued at most once per connection; the other two are
/// only accepted once the connection is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Request a document: joins its room and triggers a `load-document` reply.
    GetDocument {
        #[serde(rename = "documentId")]
        document_id: String,
    },

    /// An incremental local edit, relayed to room peers as `changes-received`.
    SendChanges { delta: Delta },

    /// Periodic full snapshot, persisted keyed by the joined document id.
    SaveDocument { delta: Delta },
}

impl ClientMessage {
    pub fn get_document(document_id: impl Into<String>) -> Self {
        ClientMessage::GetDocument {
            document_id: document_id.into(),
        }
    }

    pub fn send_changes(delta: Delta) -> Self {
        ClientMessage::SendChanges { delta }
    }

    pub fn save_document(delta: Delta) -> Self {
        ClientMessage::SaveDocument { delta }
    }

    /// Event name as it appears on the wire, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::GetDocument { .. } => "get-document",
            ClientMessage::SendChanges { .. } => "send-changes",
            ClientMessage::SaveDocument { .. } => "save-document",
        }
    }
}
