//! SQLite storage backend

use crate::{DocumentStore, StoreError, StoreStats};
use async_trait::async_trait;
use codoc_core::{Delta, Document, DocumentId};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// SQLite storage backend
///
/// Embedded persistence suitable for single-node deployments. Snapshots are
/// stored as JSON text; the primary key on `id` is the single-create
/// constraint that keeps concurrent `find_or_create` races to one row.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store with the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self {
            conn: Mutex::new(conn),
        };

        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self {
            conn: Mutex::new(conn),
        };

        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000),
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000)
            );
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_document(
        id: String,
        data: String,
        created_at: u64,
        updated_at: u64,
    ) -> Result<Document, StoreError> {
        let id = DocumentId::new(id).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let data: Delta =
            serde_json::from_str(&data).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Document {
            id,
            data,
            created_at,
            updated_at,
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn find_or_create(&self, id: &DocumentId) -> Result<Document, StoreError> {
        let empty = serde_json::to_string(&Delta::empty())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let conn = self.conn.lock().unwrap();

        // Existing-row-wins: the insert is a no-op when the id is taken.
        let created = conn
            .execute(
                "INSERT INTO documents (id, data) VALUES (?1, ?2) ON CONFLICT(id) DO NOTHING",
                params![id.as_str(), empty],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if created > 0 {
            debug!(doc_id = %id, "Created document");
        }

        let row = conn
            .query_row(
                "SELECT id, data, created_at, updated_at FROM documents WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u64>(2)?,
                        row.get::<_, u64>(3)?,
                    ))
                },
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Self::row_to_document(row.0, row.1, row.2, row.3)
    }

    async fn save(&self, id: &DocumentId, data: &Delta) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(data).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let conn = self.conn.lock().unwrap();

        let affected = conn
            .execute(
                "UPDATE documents SET data = ?2, updated_at = strftime('%s', 'now') * 1000 \
                 WHERE id = ?1",
                params![id.as_str(), json],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if affected == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn load(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                "SELECT id, data, created_at, updated_at FROM documents WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u64>(2)?,
                        row.get::<_, u64>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match row {
            Some((id, data, created_at, updated_at)) => {
                Ok(Some(Self::row_to_document(id, data, created_at, updated_at)?))
            }
            None => Ok(None),
        }
    }

    async fn exists(&self, id: &DocumentId) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(count > 0)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn.lock().unwrap();

        let document_count: usize = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(StoreStats { document_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_find_or_create() {
        let store = SqliteStore::in_memory().unwrap();
        let id = DocumentId::new("doc1").unwrap();

        let doc = store.find_or_create(&id).await.unwrap();
        assert!(doc.data.is_empty());

        // Second call does not reset stored content.
        store
            .save(&id, &Delta::new(serde_json::json!("edited")))
            .await
            .unwrap();
        let doc = store.find_or_create(&id).await.unwrap();
        assert_eq!(doc.data, Delta::new(serde_json::json!("edited")));

        assert_eq!(store.stats().await.unwrap().document_count, 1);
    }

    #[tokio::test]
    async fn test_sqlite_save_overwrites() {
        let store = SqliteStore::in_memory().unwrap();
        let id = DocumentId::new("doc1").unwrap();

        store.find_or_create(&id).await.unwrap();
        store
            .save(&id, &Delta::new(serde_json::json!("v1")))
            .await
            .unwrap();
        store
            .save(&id, &Delta::new(serde_json::json!("v2")))
            .await
            .unwrap();

        let doc = store.load(&id).await.unwrap().unwrap();
        assert_eq!(doc.data, Delta::new(serde_json::json!("v2")));
    }

    #[tokio::test]
    async fn test_sqlite_save_unknown_id_fails() {
        let store = SqliteStore::in_memory().unwrap();
        let id = DocumentId::new("ghost").unwrap();

        let err = store.save(&id, &Delta::empty()).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sqlite_load_missing() {
        let store = SqliteStore::in_memory().unwrap();
        let id = DocumentId::new("missing").unwrap();

        assert!(store.load(&id).await.unwrap().is_none());
        assert!(!store.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codoc.db");
        let id = DocumentId::new("doc1").unwrap();

        {
            let store = SqliteStore::new(&path).unwrap();
            store.find_or_create(&id).await.unwrap();
            store
                .save(&id, &Delta::new(serde_json::json!("durable")))
                .await
                .unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        let doc = store.load(&id).await.unwrap().unwrap();
        assert_eq!(doc.data, Delta::new(serde_json::json!("durable")));
    }
}
