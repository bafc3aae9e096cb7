//! DuckDB document store implementation
//!
//! Documents live in a single `documents` table keyed by (collection, doc_id)
//! with the body stored as JSON text. Filters are evaluated on the decoded
//! bodies, which keeps query semantics identical to the in-memory store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use duckdb::{params, Connection};
use uuid::Uuid;

use crate::adapters::live::LiveQueryHub;
use crate::domain::result::{Error, Result};
use crate::migrations::{MigrationResult, MigrationRunner};
use crate::ports::document_store::{matches_all, Document, DocumentStore, Filter, LiveQuery, StoredDocument};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock")
}

/// DuckDB-backed DocumentStore
pub struct DuckDbDocumentStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    hub: LiveQueryHub,
}

impl DuckDbDocumentStore {
    /// Open (or create) the database file and bring its schema up to date
    ///
    /// Retries with exponential backoff when the file is locked by another
    /// process, e.g. a second CLI invocation.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    let store = Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                        hub: LiveQueryHub::new(),
                    };
                    store.ensure_schema()?;
                    return Ok(store);
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            delay_ms = delay.as_millis() as u64,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::store(format!("failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// A throwaway in-memory database with the full schema
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
            hub: LiveQueryHub::new(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; JSON is statically linked via the "json" feature
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    /// Run pending schema migrations
    pub fn ensure_schema(&self) -> Result<MigrationResult> {
        let conn = self.lock();
        MigrationRunner::new(&conn).run_pending()
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All documents of a collection in insertion order
    fn load_collection(conn: &Connection, collection: &str) -> Result<Vec<StoredDocument>> {
        let mut stmt =
            conn.prepare("SELECT doc_id, body FROM documents WHERE collection = ? ORDER BY seq")?;
        let rows = stmt
            .query_map([collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, body)| Ok(StoredDocument::new(id, parse_body(&body)?)))
            .collect()
    }

    fn load_document(
        conn: &Connection,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>> {
        let mut stmt =
            conn.prepare("SELECT body FROM documents WHERE collection = ? AND doc_id = ?")?;
        let body = stmt
            .query_map(params![collection, id], |row| row.get::<_, String>(0))?
            .next()
            .transpose()?;

        match body {
            Some(body) => Ok(Some(StoredDocument::new(id, parse_body(&body)?))),
            None => Ok(None),
        }
    }

    /// Push snapshots of `collection` to live queries (caller holds the connection)
    ///
    /// Runs after the write is committed, so a failed reload is logged and
    /// the write still reports success.
    fn publish(&self, conn: &Connection, collection: &str) {
        if !self.hub.has_subscribers(collection) {
            return;
        }
        match Self::load_collection(conn, collection) {
            Ok(documents) => self.hub.publish(collection, &documents),
            Err(e) => {
                tracing::warn!(collection, error = %e, "failed to refresh live queries");
            }
        }
    }
}

fn parse_body(body: &str) -> Result<Document> {
    match serde_json::from_str::<serde_json::Value>(body)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(Error::store(format!(
            "document body is not an object: {}",
            other
        ))),
    }
}

#[async_trait]
impl DocumentStore for DuckDbDocumentStore {
    async fn query(&self, collection: &str, filters: &[Filter]) -> Result<Vec<StoredDocument>> {
        let conn = self.lock();
        let documents = Self::load_collection(&conn, collection)?;
        Ok(documents
            .into_iter()
            .filter(|d| matches_all(filters, &d.data))
            .collect())
    }

    async fn subscribe(&self, collection: &str, filters: Vec<Filter>) -> Result<LiveQuery> {
        let conn = self.lock();
        let documents = Self::load_collection(&conn, collection)?;
        Ok(self.hub.register(collection, filters, &documents))
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let body = serde_json::Value::Object(doc).to_string();

        let conn = self.lock();
        conn.execute(
            "INSERT INTO documents (collection, doc_id, body) VALUES (?, ?, ?)",
            params![collection, id, body],
        )?;
        self.publish(&conn, collection);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<()> {
        let conn = self.lock();
        let mut doc = Self::load_document(&conn, collection, id)?
            .ok_or_else(|| Error::not_found(format!("{}/{}", collection, id)))?;
        for (key, value) in fields {
            doc.data.insert(key, value);
        }

        let body = serde_json::Value::Object(doc.data).to_string();
        conn.execute(
            "UPDATE documents SET body = ? WHERE collection = ? AND doc_id = ?",
            params![body, collection, id],
        )?;
        self.publish(&conn, collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let conn = self.lock();
        let removed = conn.execute(
            "DELETE FROM documents WHERE collection = ? AND doc_id = ?",
            params![collection, id],
        )?;
        if removed > 0 {
            self.publish(&conn, collection);
        }
        Ok(())
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        let conn = self.lock();
        Self::load_document(&conn, collection, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_error("IO Error: Could not set lock on file"));
        assert!(is_retryable_error("The process cannot access the file"));
        assert!(!is_retryable_error("Catalog Error: Table does not exist"));
    }

    #[test]
    fn test_parse_body_rejects_non_objects() {
        assert!(parse_body("{\"a\": 1}").is_ok());
        assert!(matches!(parse_body("[1, 2]"), Err(Error::Store(_))));
        assert!(matches!(parse_body("not json"), Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_committed_write_succeeds_when_refresh_fails() {
        let store = DuckDbDocumentStore::open_in_memory().unwrap();
        let live = store.subscribe("meals", Vec::new()).await.unwrap();

        // A row the live refresh cannot parse
        store
            .lock()
            .execute(
                "INSERT INTO documents (collection, doc_id, body) VALUES ('meals', 'broken', '[1]')",
                [],
            )
            .unwrap();

        let mut doc = Document::new();
        doc.insert("date".into(), serde_json::json!("2024-03-04"));
        let id = store.insert("meals", doc).await.unwrap();

        let stored = store.get_by_id("meals", &id).await.unwrap().unwrap();
        assert_eq!(stored.get_str("date"), Some("2024-03-04"));
        // Subscribers keep the last good snapshot
        assert!(live.snapshot().is_empty());
    }
}
