//! SQLite-backed persistence for users, documents, chunks and chat history.
//!
//! A single connection is shared behind a mutex. Every multi-row write runs in
//! its own transaction that is committed or rolled back before the lock is
//! released, so callers never hold a transaction across network or extraction
//! work.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::schema::SCHEMA_SQL;
use crate::types::*;
use insight_core::{Error, Result};

/// SQLite store shared by request handlers and background writers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the database file at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Storage(e.to_string()))?;
        }

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        info!(
            "SqliteStore initialized: {} documents, {} chunks, path={}",
            store.count_documents()?,
            store.count_chunks(None)?,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))
    }

    /// Path of the underlying database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run a closure against the raw connection, for maintenance and tests.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn).map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------

    /// Insert the user if absent. An existing row is left untouched.
    pub fn upsert_user(&self, user_id: &str, email: &str) -> Result<()> {
        let conn = self.conn.lock();
        let inserted = conn
            .prepare_cached("INSERT OR IGNORE INTO users (id, email, created_at) VALUES (?1, ?2, ?3)")
            .map_err(db_err)?
            .execute(params![user_id, email, now_timestamp()])
            .map_err(db_err)?;
        if inserted > 0 {
            debug!("Created user {}", user_id);
        }
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id, email, created_at FROM users WHERE id = ?1")
            .map_err(db_err)?;
        let user = stmt
            .query_row(params![user_id], |row| {
                Ok(User {
                    id: row.get("id")?,
                    email: row.get("email")?,
                    created_at: row.get("created_at")?,
                })
            })
            .optional()
            .map_err(db_err)?;
        Ok(user)
    }

    // ---------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------

    /// Insert a document row and all of its chunks in one transaction.
    ///
    /// Chunk indices are assigned from the slice order starting at 0. If any
    /// insert fails, nothing is written.
    pub fn insert_document_with_chunks(&self, doc: &NewDocument, chunks: &[String]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "INSERT INTO documents (id, user_id, file_name, storage_path, uploaded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![doc.id, doc.user_id, doc.file_name, doc.storage_path, now_timestamp()],
        )
        .map_err(|e| Error::Database(format!("Failed to insert document {}: {}", doc.id, e)))?;

        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO document_chunks (id, document_id, chunk_index, content) \
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(db_err)?;
            for (index, content) in chunks.iter().enumerate() {
                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    doc.id,
                    index as i64,
                    content
                ])
                .map_err(|e| {
                    Error::Database(format!(
                        "Failed to insert chunk {} of document {}: {}",
                        index, doc.id, e
                    ))
                })?;
            }
        }

        tx.commit().map_err(db_err)?;
        debug!("Committed document {} with {} chunks", doc.id, chunks.len());
        Ok(())
    }

    pub fn get_document(&self, doc_id: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, user_id, file_name, storage_path, uploaded_at FROM documents \
                 WHERE id = ?1",
            )
            .map_err(db_err)?;
        let doc = stmt
            .query_row(params![doc_id], Self::row_to_document)
            .optional()
            .map_err(db_err)?;
        Ok(doc)
    }

    /// Documents owned by `user_id`, newest first.
    pub fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, file_name, uploaded_at FROM documents WHERE user_id = ?1 \
                 ORDER BY uploaded_at DESC, rowid DESC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(DocumentSummary {
                    id: row.get("id")?,
                    file_name: row.get("file_name")?,
                    uploaded_at: row.get("uploaded_at")?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Storage location of a document, only if it is owned by `user_id`.
    pub fn find_storage_path(&self, doc_id: &str, user_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT storage_path FROM documents WHERE id = ?1 AND user_id = ?2")
            .map_err(db_err)?;
        let path = stmt
            .query_row(params![doc_id, user_id], |row| row.get(0))
            .optional()
            .map_err(db_err)?;
        Ok(path)
    }

    /// Whether `doc_id` exists and belongs to `user_id`.
    pub fn is_document_owner(&self, doc_id: &str, user_id: &str) -> Result<bool> {
        Ok(self.find_storage_path(doc_id, user_id)?.is_some())
    }

    /// Delete a document. Chunks and chat history go with it (cascade).
    pub fn delete_document(&self, doc_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![doc_id])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    pub fn count_documents(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Chunks
    // ---------------------------------------------------------------

    /// All chunks of a document in sequence order.
    pub fn get_chunks_for_document(&self, doc_id: &str) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, document_id, chunk_index, content, embedding FROM document_chunks \
                 WHERE document_id = ?1 ORDER BY chunk_index",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![doc_id], |row| {
                Ok(Chunk {
                    id: row.get("id")?,
                    document_id: row.get("document_id")?,
                    chunk_index: row.get("chunk_index")?,
                    content: row.get("content")?,
                    embedding: row.get("embedding")?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Count chunks, optionally restricted to one document.
    pub fn count_chunks(&self, doc_id: Option<&str>) -> Result<i64> {
        let conn = self.conn.lock();
        match doc_id {
            Some(id) => conn.query_row(
                "SELECT COUNT(*) FROM document_chunks WHERE document_id = ?1",
                params![id],
                |row| row.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM document_chunks", [], |row| row.get(0)),
        }
        .map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Chat history
    // ---------------------------------------------------------------

    /// Append a question and its answer as one unit.
    ///
    /// The `user` turn is inserted before the `ai` turn in the same
    /// transaction, so a reader never sees an answer without its question.
    pub fn append_chat_pair(
        &self,
        doc_id: &str,
        user_id: &str,
        question: &str,
        answer: &str,
    ) -> Result<()> {
        // Both turns share one timestamp; rowid keeps the question first.
        let timestamp = now_timestamp();
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO chat_history \
                     (id, document_id, user_id, message_type, message_content, timestamp) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(db_err)?;
            for (role, content) in [(MessageRole::User, question), (MessageRole::Ai, answer)] {
                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    doc_id,
                    user_id,
                    role.as_str(),
                    content,
                    timestamp,
                ])
                .map_err(|e| {
                    Error::Database(format!("Failed to save {} message: {}", role, e))
                })?;
            }
        }

        tx.commit().map_err(db_err)
    }

    /// Chat history of a document, oldest first.
    pub fn get_chat_history(&self, doc_id: &str) -> Result<Vec<ChatTurn>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, document_id, user_id, message_type, message_content, timestamp \
                 FROM chat_history WHERE document_id = ?1 ORDER BY timestamp, rowid",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![doc_id], Self::row_to_chat_turn)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn count_chat_turns(&self, doc_id: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM chat_history WHERE document_id = ?1",
            params![doc_id],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Row Mapping Helpers
    // ---------------------------------------------------------------

    fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
        Ok(Document {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            file_name: row.get("file_name")?,
            storage_path: row.get("storage_path")?,
            uploaded_at: row.get("uploaded_at")?,
        })
    }

    fn row_to_chat_turn(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatTurn> {
        let role: String = row.get("message_type")?;
        let role = role
            .parse::<MessageRole>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
        Ok(ChatTurn {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            user_id: row.get("user_id")?,
            role,
            content: row.get("message_content")?,
            timestamp: row.get("timestamp")?,
        })
    }
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

/// Current time as a sortable RFC 3339 string with microsecond precision.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
