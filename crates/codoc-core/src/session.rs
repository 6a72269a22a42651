//! Per-connection session state
//!
//! The joined document is an explicit value the connection handler owns.
//! A connection starts in `AwaitingDocument`, moves to `Active` after its
//! single `get-document` completes, and stays there until disconnect.

use crate::document::DocumentId;

/// Protocol state of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no document requested yet.
    AwaitingDocument,
    /// Joined the room for `document_id`; changes and saves are accepted.
    Active { document_id: DocumentId },
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active { .. })
    }

    /// The joined document, if the session is active.
    pub fn document_id(&self) -> Option<&DocumentId> {
        match self {
            SessionState::AwaitingDocument => None,
            SessionState::Active { document_id } => Some(document_id),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::AwaitingDocument
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let mut state = SessionState::default();
        assert!(!state.is_active());
        assert_eq!(state.document_id(), None);

        let id = DocumentId::new("doc1").unwrap();
        state = SessionState::Active {
            document_id: id.clone(),
        };
        assert!(state.is_active());
        assert_eq!(state.document_id(), Some(&id));
    }
}
