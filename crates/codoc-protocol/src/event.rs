//! Server-to-client messages

use codoc_core::Delta;
use serde::{Deserialize, Serialize};

/// A message sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Unicast reply to `get-document`: the full current document state.
    /// Receiving this initializes and unlocks the local editor.
    LoadDocument { delta: Delta },

    /// Room broadcast (minus sender) of a peer's incremental edit.
    ChangesReceived { delta: Delta },

    /// Explicit failure surfaced to the client instead of a silent no-op.
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn load_document(delta: Delta) -> Self {
        ServerMessage::LoadDocument { delta }
    }

    pub fn changes_received(delta: Delta) -> Self {
        ServerMessage::ChangesReceived { delta }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Event name as it appears on the wire, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::LoadDocument { .. } => "load-document",
            ServerMessage::ChangesReceived { .. } => "changes-received",
            ServerMessage::Error { .. } => "error",
        }
    }
}
