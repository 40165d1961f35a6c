//! SQLite-based document and conversation store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use studio_core::{
    now_millis, Document, DocumentStatus, DocumentStore, DocumentUpdate, FileType, Message,
    MessagePart, Result, Role, Stats, StudioError,
};

use crate::schema::{SCHEMA, SCHEMA_VERSION};

const DOCUMENT_COLUMNS: &str = "id, title, filename, file_type, file_size, status, error_message, \
     chunk_count, vector_count, content_length, content_hash, video_url, uploaded_at, processed_at";

/// SQLite-based store implementation.
///
/// One connection per process, guarded by a blocking Mutex. Clones share
/// the same connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, 30000)
    }

    /// Open or create a database with a custom busy timeout.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout_ms: u32) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StudioError::database(format!("Failed to open database: {}", e)))?;

        Self::init(conn, path, busy_timeout_ms)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StudioError::database(format!("Failed to open in-memory database: {}", e))
        })?;

        Self::init(conn, Path::new(":memory:"), 30000)
    }

    fn init(conn: Connection, path: &Path, busy_timeout_ms: u32) -> Result<Self> {
        Self::configure_connection(&conn, busy_timeout_ms)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| StudioError::database(format!("Failed to initialize schema: {}", e)))?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|e| StudioError::database(format!("Failed to set schema version: {}", e)))?;

        info!("Database opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection, busy_timeout_ms: u32) -> Result<()> {
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = {};
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
            busy_timeout_ms
        ))
        .map_err(|e| StudioError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Schema version recorded in the database.
    pub fn schema_version(&self) -> Result<u32> {
        self.with_conn(|conn| {
            conn.pragma_query_value(None, "user_version", |row| row.get(0))
                .map_err(|e| StudioError::database(e.to_string()))
        })
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StudioError::database(e.to_string()))?;
        f(&conn)
    }

    /// Execute a mutable blocking operation on the connection.
    fn with_conn_mut<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StudioError::database(e.to_string()))?;
        f(&mut conn)
    }

    fn write_document(conn: &Connection, doc: &Document) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO documents ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                DOCUMENT_COLUMNS
            ),
            params![
                doc.id,
                doc.title,
                doc.filename,
                doc.file_type.as_str(),
                doc.file_size as i64,
                doc.status.as_str(),
                doc.error_message,
                doc.chunk_count,
                doc.vector_count,
                doc.content_length.map(|n| n as i64),
                doc.content_hash,
                doc.video_url,
                doc.uploaded_at as i64,
                doc.processed_at.map(|t| t as i64),
            ],
        )
        .map_err(|e| StudioError::database(format!("Failed to write document: {}", e)))?;
        Ok(())
    }

    fn read_document(conn: &Connection, id: &str) -> Result<Option<Document>> {
        conn.query_row(
            &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
            params![id],
            Self::row_to_document,
        )
        .optional()
        .map_err(|e| StudioError::database(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    // Document operations

    async fn insert_document(&self, doc: Document) -> Result<()> {
        self.with_conn(|conn| {
            Self::write_document(conn, &doc)?;
            debug!("Inserted document: {} ({})", doc.id, doc.filename);
            Ok(())
        })
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        self.with_conn(|conn| Self::read_document(conn, id))
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM documents ORDER BY uploaded_at DESC, id DESC",
                    DOCUMENT_COLUMNS
                ))
                .map_err(|e| StudioError::database(e.to_string()))?;

            let docs = stmt
                .query_map([], Self::row_to_document)
                .map_err(|e| StudioError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| StudioError::database(e.to_string()))?;

            Ok(docs)
        })
    }

    async fn update_document(&self, id: &str, update: DocumentUpdate) -> Result<Document> {
        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StudioError::database(e.to_string()))?;

            let mut doc = Self::read_document(&tx, id)?.ok_or_else(|| {
                StudioError::DocumentNotFound { id: id.to_string() }
            })?;
            doc.apply(&update);
            Self::write_document(&tx, &doc)?;

            tx.commit()
                .map_err(|e| StudioError::database(e.to_string()))?;

            debug!("Updated document {}: status={}", doc.id, doc.status);
            Ok(doc)
        })
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM documents WHERE id = ?1", params![id])
                .map_err(|e| StudioError::database(e.to_string()))?;

            if deleted == 0 {
                return Err(StudioError::DocumentNotFound { id: id.to_string() });
            }

            debug!("Deleted document: {}", id);
            Ok(())
        })
    }

    // Conversation operations

    async fn append_messages(&self, conversation_id: &str, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| StudioError::database(e.to_string()))?;

            let mut appended = 0;
            {
                // Messages already stored under the same id are left untouched
                let mut stmt = tx
                    .prepare(
                        "INSERT OR IGNORE INTO messages (id, conversation_id, role, parts, created_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )
                    .map_err(|e| StudioError::database(e.to_string()))?;

                let created_at = now_millis() as i64;
                for message in messages {
                    let parts = if message.parts.is_empty() {
                        vec![MessagePart::Text {
                            text: message.content.clone().unwrap_or_default(),
                        }]
                    } else {
                        message.parts.clone()
                    };
                    let parts_json = serde_json::to_string(&parts)?;

                    appended += stmt
                        .execute(params![
                            message.id,
                            conversation_id,
                            message.role.as_str(),
                            parts_json,
                            created_at,
                        ])
                        .map_err(|e| StudioError::database(e.to_string()))?;
                }
            }

            tx.commit()
                .map_err(|e| StudioError::database(e.to_string()))?;

            debug!(
                "Appended {} of {} messages to conversation {}",
                appended,
                messages.len(),
                conversation_id
            );
            Ok(())
        })
    }

    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, role, parts FROM messages WHERE conversation_id = ?1 ORDER BY seq",
                )
                .map_err(|e| StudioError::database(e.to_string()))?;

            let rows = stmt
                .query_map(params![conversation_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(|e| StudioError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| StudioError::database(e.to_string()))?;

            rows.into_iter()
                .map(|(id, role, parts)| {
                    let role = Role::parse(&role).ok_or_else(|| {
                        StudioError::database(format!("Unknown message role: {}", role))
                    })?;
                    Ok(Message {
                        id,
                        role,
                        parts: serde_json::from_str(&parts)?,
                        content: None,
                    })
                })
                .collect()
        })
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM messages WHERE conversation_id = ?1",
                    params![conversation_id],
                )
                .map_err(|e| StudioError::database(e.to_string()))?;

            debug!("Deleted {} messages from conversation {}", deleted, conversation_id);
            Ok(deleted as u64)
        })
    }

    // Stats

    async fn get_stats(&self) -> Result<Stats> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64> {
                conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                    .map(|n| n as u64)
                    .map_err(|e| StudioError::database(e.to_string()))
            };

            Ok(Stats {
                documents: count("SELECT COUNT(*) FROM documents")?,
                completed_documents: count(
                    "SELECT COUNT(*) FROM documents WHERE status = 'completed'",
                )?,
                messages: count("SELECT COUNT(*) FROM messages")?,
                vectors: None,
            })
        })
    }
}

// Helper methods
impl SqliteStore {
    /// Convert a row to a Document.
    fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
        let file_type: String = row.get(3)?;
        let status: String = row.get(5)?;

        Ok(Document {
            id: row.get(0)?,
            title: row.get(1)?,
            filename: row.get(2)?,
            file_type: FileType::parse(&file_type).unwrap_or(FileType::Txt),
            file_size: row.get::<_, i64>(4)? as u64,
            status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Error),
            error_message: row.get(6)?,
            chunk_count: row.get(7)?,
            vector_count: row.get(8)?,
            content_length: row.get::<_, Option<i64>>(9)?.map(|n| n as u64),
            content_hash: row.get(10)?,
            video_url: row.get(11)?,
            uploaded_at: row.get::<_, i64>(12)? as u64,
            processed_at: row.get::<_, Option<i64>>(13)?.map(|t| t as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str, uploaded_at: u64) -> Document {
        let mut doc = Document::new(title, &format!("{}.txt", title), FileType::Txt, 42);
        doc.uploaded_at = uploaded_at;
        doc
    }

    #[tokio::test]
    async fn test_open_memory() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(store.list_documents().await.unwrap().is_empty());
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("studio.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_document(doc("persisted", 1)).await.unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let docs = reopened.list_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "persisted");
    }

    #[tokio::test]
    async fn test_document_crud() {
        let store = SqliteStore::open_memory().unwrap();

        // Create
        let original = doc("report", 1000);
        let id = original.id.clone();
        store.insert_document(original.clone()).await.unwrap();

        // Read
        let retrieved = store.get_document(&id).await.unwrap().unwrap();
        assert_eq!(retrieved, original);
        assert_eq!(retrieved.status, DocumentStatus::Processing);

        // Update
        let updated = store
            .update_document(
                &id,
                DocumentUpdate {
                    status: Some(DocumentStatus::Completed),
                    chunk_count: Some(3),
                    vector_count: Some(3),
                    content_length: Some(4500),
                    processed_at: Some(2000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, DocumentStatus::Completed);
        assert_eq!(updated.chunk_count, Some(3));
        assert_eq!(store.get_document(&id).await.unwrap().unwrap(), updated);

        // Delete
        store.delete_document(&id).await.unwrap();
        assert!(store.get_document(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_document() {
        let store = SqliteStore::open_memory().unwrap();

        let err = store
            .update_document("doc-missing", DocumentUpdate::failed("boom"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "DOCUMENT_NOT_FOUND");

        let err = store.delete_document("doc-missing").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert_document(doc("old", 100)).await.unwrap();
        store.insert_document(doc("new", 300)).await.unwrap();
        store.insert_document(doc("mid", 200)).await.unwrap();

        let titles: Vec<String> = store
            .list_documents()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.title)
            .collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_messages_keep_order() {
        let store = SqliteStore::open_memory().unwrap();

        let first = Message::user("What is in the report?");
        let second = Message::assistant("Quarterly numbers.");
        let third = Message::user("Which quarter?");

        store
            .append_messages("doc-1", &[first.clone(), second.clone()])
            .await
            .unwrap();
        store.append_messages("doc-1", &[third.clone()]).await.unwrap();
        store
            .append_messages("doc-2", &[Message::user("other")])
            .await
            .unwrap();

        let loaded = store.load_messages("doc-1").await.unwrap();
        assert_eq!(loaded, vec![first, second, third]);
    }

    #[tokio::test]
    async fn test_resent_messages_not_duplicated() {
        let store = SqliteStore::open_memory().unwrap();

        let question = Message::user("Hello?");
        let answer = Message::assistant("Hi.");
        store.append_messages("c", &[question.clone()]).await.unwrap();
        store
            .append_messages("c", &[question.clone(), answer.clone()])
            .await
            .unwrap();

        let loaded = store.load_messages("c").await.unwrap();
        assert_eq!(loaded, vec![question, answer]);
    }

    #[tokio::test]
    async fn test_legacy_content_stored_as_part() {
        let store = SqliteStore::open_memory().unwrap();

        let legacy = Message {
            id: "msg_legacy".to_string(),
            role: Role::User,
            parts: Vec::new(),
            content: Some("plain text".to_string()),
        };
        store.append_messages("c", &[legacy]).await.unwrap();

        let loaded = store.load_messages("c").await.unwrap();
        assert_eq!(loaded[0].first_text(), Some("plain text"));
        assert!(loaded[0].content.is_none());
    }

    #[tokio::test]
    async fn test_delete_conversation() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .append_messages("c", &[Message::user("a"), Message::assistant("b")])
            .await
            .unwrap();

        assert_eq!(store.delete_conversation("c").await.unwrap(), 2);
        assert!(store.load_messages("c").await.unwrap().is_empty());
        assert_eq!(store.delete_conversation("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = SqliteStore::open_memory().unwrap();

        let done = doc("done", 1);
        let done_id = done.id.clone();
        store.insert_document(done).await.unwrap();
        store.insert_document(doc("pending", 2)).await.unwrap();
        store
            .update_document(
                &done_id,
                DocumentUpdate {
                    status: Some(DocumentStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .append_messages(&done_id, &[Message::user("q")])
            .await
            .unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.completed_documents, 1);
        assert_eq!(stats.messages, 1);
        assert!(stats.vectors.is_none());
    }
}
