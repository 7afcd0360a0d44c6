//! SQLite store for document metadata and chat history
//!
//! The pipeline consumes this through plain record operations; the schema
//! keys documents by (tenant_id, filename) unique and chat turns by tenant
//! and creation time.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{ChatTurn, Document};

/// SQLite-backed metadata and history store
pub struct MetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl MetadataStore {
    /// Create or open the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Metadata(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Metadata(format!("Failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
        "#,
        )
        .map_err(|e| Error::Metadata(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                chunk_count INTEGER NOT NULL,
                uploaded_at TEXT NOT NULL,
                UNIQUE(tenant_id, filename)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_tenant ON documents(tenant_id, uploaded_at);

            CREATE TABLE IF NOT EXISTS chat_turns (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                source_file TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chat_turns_tenant ON chat_turns(tenant_id, created_at);
        "#,
        )
        .map_err(|e| Error::Metadata(format!("Failed to run migrations: {}", e)))?;

        Ok(())
    }

    /// Insert a document record. Violating the (tenant, filename)
    /// uniqueness constraint maps to `DuplicateFilename`.
    pub fn insert_document(&self, doc: &Document) -> Result<()> {
        let conn = self.conn.lock();

        let result = conn.execute(
            "INSERT INTO documents (id, tenant_id, filename, chunk_count, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                doc.id.to_string(),
                doc.tenant_id,
                doc.filename,
                doc.chunk_count,
                doc.uploaded_at,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::DuplicateFilename {
                    tenant_id: doc.tenant_id.clone(),
                    filename: doc.filename.clone(),
                })
            }
            Err(e) => Err(Error::Metadata(e.to_string())),
        }
    }

    /// Look up a document by (tenant, filename)
    pub fn get_document(&self, tenant_id: &str, filename: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT id, tenant_id, filename, chunk_count, uploaded_at
             FROM documents WHERE tenant_id = ?1 AND filename = ?2",
            params![tenant_id, filename],
            row_to_document,
        )
        .optional()
        .map_err(|e| Error::Metadata(e.to_string()))
    }

    /// List a tenant's documents, newest first
    pub fn list_documents(&self, tenant_id: &str) -> Result<Vec<Document>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                "SELECT id, tenant_id, filename, chunk_count, uploaded_at
                 FROM documents WHERE tenant_id = ?1 ORDER BY uploaded_at DESC",
            )
            .map_err(|e| Error::Metadata(e.to_string()))?;

        let rows = stmt
            .query_map(params![tenant_id], row_to_document)
            .map_err(|e| Error::Metadata(e.to_string()))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Metadata(e.to_string()))
    }

    /// Delete a document record. Returns false when nothing matched.
    pub fn delete_document(&self, tenant_id: &str, filename: &str) -> Result<bool> {
        let conn = self.conn.lock();

        let deleted = conn
            .execute(
                "DELETE FROM documents WHERE tenant_id = ?1 AND filename = ?2",
                params![tenant_id, filename],
            )
            .map_err(|e| Error::Metadata(e.to_string()))?;

        Ok(deleted > 0)
    }

    /// Insert a chat turn
    pub fn insert_chat_turn(&self, turn: &ChatTurn) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO chat_turns (id, tenant_id, question, answer, source_file, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                turn.id.to_string(),
                turn.tenant_id,
                turn.question,
                turn.answer,
                turn.source_file,
                turn.created_at,
            ],
        )
        .map_err(|e| Error::Metadata(e.to_string()))?;

        Ok(())
    }

    /// List a tenant's chat turns, newest first, optionally filtered to one
    /// source document
    pub fn list_chat_turns(
        &self,
        tenant_id: &str,
        source_file: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatTurn>> {
        let conn = self.conn.lock();

        match source_file {
            Some(source) => {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, tenant_id, question, answer, source_file, created_at
                         FROM chat_turns
                         WHERE tenant_id = ?1 AND source_file = ?2
                         ORDER BY created_at DESC LIMIT ?3",
                    )
                    .map_err(|e| Error::Metadata(e.to_string()))?;
                collect_turns(&mut stmt, &[&tenant_id, &source, &(limit as i64)])
            }
            None => {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, tenant_id, question, answer, source_file, created_at
                         FROM chat_turns
                         WHERE tenant_id = ?1
                         ORDER BY created_at DESC LIMIT ?2",
                    )
                    .map_err(|e| Error::Metadata(e.to_string()))?;
                collect_turns(&mut stmt, &[&tenant_id, &(limit as i64)])
            }
        }
    }

    /// Delete a tenant's chat turns, optionally filtered to one source
    /// document. Returns the number of deleted turns.
    pub fn clear_chat_turns(&self, tenant_id: &str, source_file: Option<&str>) -> Result<usize> {
        let conn = self.conn.lock();

        let deleted = match source_file {
            Some(source) => conn.execute(
                "DELETE FROM chat_turns WHERE tenant_id = ?1 AND source_file = ?2",
                params![tenant_id, source],
            ),
            None => conn.execute(
                "DELETE FROM chat_turns WHERE tenant_id = ?1",
                params![tenant_id],
            ),
        }
        .map_err(|e| Error::Metadata(e.to_string()))?;

        Ok(deleted)
    }
}

fn collect_turns(
    stmt: &mut rusqlite::Statement<'_>,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<ChatTurn>> {
    let rows = stmt
        .query_map(params, row_to_chat_turn)
        .map_err(|e| Error::Metadata(e.to_string()))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Metadata(e.to_string()))
}

fn parse_uuid(value: String) -> std::result::Result<Uuid, rusqlite::Error> {
    Uuid::parse_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_document(row: &rusqlite::Row<'_>) -> std::result::Result<Document, rusqlite::Error> {
    Ok(Document {
        id: parse_uuid(row.get::<_, String>(0)?)?,
        tenant_id: row.get(1)?,
        filename: row.get(2)?,
        chunk_count: row.get(3)?,
        uploaded_at: row.get::<_, DateTime<Utc>>(4)?,
    })
}

fn row_to_chat_turn(row: &rusqlite::Row<'_>) -> std::result::Result<ChatTurn, rusqlite::Error> {
    Ok(ChatTurn {
        id: parse_uuid(row.get::<_, String>(0)?)?,
        tenant_id: row.get(1)?,
        question: row.get(2)?,
        answer: row.get(3)?,
        source_file: row.get(4)?,
        created_at: row.get::<_, DateTime<Utc>>(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(tenant: &str, filename: &str, chunks: u32) -> Document {
        let mut doc = Document::new(tenant, filename);
        doc.chunk_count = chunks;
        doc
    }

    #[test]
    fn test_insert_and_get() {
        let store = MetadataStore::in_memory().unwrap();
        store.insert_document(&doc("t1", "a.pdf", 7)).unwrap();

        let fetched = store.get_document("t1", "a.pdf").unwrap().unwrap();
        assert_eq!(fetched.filename, "a.pdf");
        assert_eq!(fetched.chunk_count, 7);

        assert!(store.get_document("t2", "a.pdf").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_filename_is_rejected() {
        let store = MetadataStore::in_memory().unwrap();
        store.insert_document(&doc("t1", "a.pdf", 1)).unwrap();

        let result = store.insert_document(&doc("t1", "a.pdf", 2));
        assert!(matches!(result, Err(Error::DuplicateFilename { .. })));

        // Same filename for a different tenant is fine
        store.insert_document(&doc("t2", "a.pdf", 1)).unwrap();
    }

    #[test]
    fn test_list_documents_newest_first() {
        let store = MetadataStore::in_memory().unwrap();

        let mut first = doc("t1", "old.pdf", 1);
        first.uploaded_at = Utc::now() - chrono::Duration::minutes(5);
        store.insert_document(&first).unwrap();
        store.insert_document(&doc("t1", "new.pdf", 1)).unwrap();
        store.insert_document(&doc("t2", "other.pdf", 1)).unwrap();

        let docs = store.list_documents("t1").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].filename, "new.pdf");
        assert_eq!(docs[1].filename, "old.pdf");
    }

    #[test]
    fn test_delete_document_is_idempotent() {
        let store = MetadataStore::in_memory().unwrap();
        store.insert_document(&doc("t1", "a.pdf", 1)).unwrap();

        assert!(store.delete_document("t1", "a.pdf").unwrap());
        assert!(!store.delete_document("t1", "a.pdf").unwrap());
    }

    #[test]
    fn test_chat_turns_filter_by_source() {
        let store = MetadataStore::in_memory().unwrap();
        store
            .insert_chat_turn(&ChatTurn::new("t1", "q1", "a1", Some("doc.pdf".into())))
            .unwrap();
        store
            .insert_chat_turn(&ChatTurn::new("t1", "q2", "a2", None))
            .unwrap();

        let all = store.list_chat_turns("t1", None, 20).unwrap();
        assert_eq!(all.len(), 2);

        let filtered = store.list_chat_turns("t1", Some("doc.pdf"), 20).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].question, "q1");
    }

    #[test]
    fn test_clear_history_is_tenant_scoped() {
        let store = MetadataStore::in_memory().unwrap();
        store
            .insert_chat_turn(&ChatTurn::new("t1", "q1", "a1", Some("doc.pdf".into())))
            .unwrap();
        store
            .insert_chat_turn(&ChatTurn::new("t1", "q2", "a2", None))
            .unwrap();
        store
            .insert_chat_turn(&ChatTurn::new("t2", "q3", "a3", None))
            .unwrap();

        // No filter clears every turn for the tenant
        let deleted = store.clear_chat_turns("t1", None).unwrap();
        assert_eq!(deleted, 2);
        assert!(store.list_chat_turns("t1", None, 20).unwrap().is_empty());

        // Other tenants untouched
        assert_eq!(store.list_chat_turns("t2", None, 20).unwrap().len(), 1);
    }

    #[test]
    fn test_clear_history_by_source_file() {
        let store = MetadataStore::in_memory().unwrap();
        store
            .insert_chat_turn(&ChatTurn::new("t1", "q1", "a1", Some("doc.pdf".into())))
            .unwrap();
        store
            .insert_chat_turn(&ChatTurn::new("t1", "q2", "a2", None))
            .unwrap();

        let deleted = store.clear_chat_turns("t1", Some("doc.pdf")).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.list_chat_turns("t1", None, 20).unwrap().len(), 1);
    }
}
