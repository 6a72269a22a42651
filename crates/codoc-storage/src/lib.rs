//! codoc Storage Backends
//!
//! Durable key-value persistence: one record per document id holding the
//! latest full snapshot. Backends:
//! - Memory (default): fast, volatile, for development and tests
//! - SQLite: embedded persistence
//!
//! `find_or_create` is the only creation path and must never produce two
//! records for one id, even under concurrent calls; `save` is a last-write-
//! wins overwrite of the snapshot.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use codoc_core::{Delta, Document, DocumentId};

/// Document persistence contract.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Return the document for `id`, creating it with empty default content
    /// if absent. Concurrent calls for the same new id race to create, but
    /// exactly one record wins; both callers observe a single stored row.
    async fn find_or_create(&self, id: &DocumentId) -> Result<Document, StoreError>;

    /// Overwrite the stored snapshot for `id`.
    ///
    /// Fails with `StoreError::NotFound` when the id was never created; the
    /// protocol never reaches that case because saves are only accepted on
    /// connections whose `find_or_create` already succeeded.
    async fn save(&self, id: &DocumentId, data: &Delta) -> Result<(), StoreError>;

    /// Load a document without creating it.
    async fn load(&self, id: &DocumentId) -> Result<Option<Document>, StoreError>;

    /// Check if a document exists.
    async fn exists(&self, id: &DocumentId) -> Result<bool, StoreError>;

    /// Get storage statistics.
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub document_count: usize,
}

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
