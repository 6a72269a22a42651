//! Document identity and the persisted record

use crate::delta::Delta;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Document identifier - UTF-8 string, max 512 bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new document ID, validating the format
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidDocumentId("Document ID cannot be empty".into()));
        }

        if id.len() > 512 {
            return Err(Error::InvalidDocumentId("Document ID exceeds 512 bytes".into()));
        }

        if id.chars().any(|c| c.is_control()) {
            return Err(Error::InvalidDocumentId(
                "Document ID must not contain control characters".into(),
            ));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored document: the latest full snapshot for one id.
///
/// There is at most one record per id; `data` is last-writer-wins across the
/// periodic snapshot saves from all clients in the document's room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub data: Delta,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Document {
    /// A freshly created document with default empty content.
    pub fn new(id: DocumentId) -> Self {
        let now = now_ms();
        Self {
            id,
            data: Delta::empty(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the stored snapshot.
    pub fn overwrite(&mut self, data: Delta) {
        self.data = data;
        self.updated_at = now_ms();
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
