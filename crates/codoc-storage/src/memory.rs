//! In-memory storage backend

use crate::{DocumentStore, StoreError, StoreStats};
use async_trait::async_trait;
use codoc_core::{Delta, Document, DocumentId};
use dashmap::DashMap;

/// In-memory storage backend
///
/// Fast, volatile storage suitable for development and tests.
/// Data is lost when the process exits.
pub struct MemoryStore {
    documents: DashMap<String, Document>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_or_create(&self, id: &DocumentId) -> Result<Document, StoreError> {
        // Entry API: concurrent creates for one id resolve to a single row.
        let entry = self
            .documents
            .entry(id.as_str().to_string())
            .or_insert_with(|| Document::new(id.clone()));
        Ok(entry.value().clone())
    }

    async fn save(&self, id: &DocumentId, data: &Delta) -> Result<(), StoreError> {
        match self.documents.get_mut(id.as_str()) {
            Some(mut doc) => {
                doc.overwrite(data.clone());
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn load(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.get(id.as_str()).map(|d| d.value().clone()))
    }

    async fn exists(&self, id: &DocumentId) -> Result<bool, StoreError> {
        Ok(self.documents.contains_key(id.as_str()))
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats {
            document_count: self.documents.len(),
        })
    }
}
