//! In-memory document store
//!
//! Reference implementation of the DocumentStore port. Commits and snapshot
//! publication happen under one lock, so every subscription observes commits
//! in order. Used by tests and by sessions that need no persistence.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::adapters::live::LiveQueryHub;
use crate::domain::result::{Error, Result};
use crate::ports::document_store::{matches_all, Document, DocumentStore, Filter, LiveQuery, StoredDocument};

#[derive(Default)]
struct Collections {
    documents: HashMap<String, Vec<StoredDocument>>,
    /// (collection, id) pairs whose update/delete is rejected
    denied: HashSet<(String, String)>,
}

/// In-memory DocumentStore
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<Collections>,
    hub: LiveQueryHub,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject future updates and deletes of one document, as a store would
    /// on a permission failure
    pub fn deny_writes(&self, collection: &str, id: &str) {
        let mut collections = self.lock();
        collections
            .denied
            .insert((collection.to_string(), id.to_string()));
    }

    /// Number of live queries currently registered
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(collections: &Collections, collection: &str, id: &str) -> Result<()> {
        if collections
            .denied
            .contains(&(collection.to_string(), id.to_string()))
        {
            return Err(Error::store(format!(
                "permission denied writing {}/{}",
                collection, id
            )));
        }
        Ok(())
    }

    fn publish(&self, collections: &Collections, collection: &str) {
        let documents = collections
            .documents
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        self.hub.publish(collection, documents);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn query(&self, collection: &str, filters: &[Filter]) -> Result<Vec<StoredDocument>> {
        let collections = self.lock();
        Ok(collections
            .documents
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| matches_all(filters, &d.data))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn subscribe(&self, collection: &str, filters: Vec<Filter>) -> Result<LiveQuery> {
        let collections = self.lock();
        let documents = collections
            .documents
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        Ok(self.hub.register(collection, filters, documents))
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let mut collections = self.lock();
        collections
            .documents
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument::new(id.clone(), doc));
        self.publish(&collections, collection);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<()> {
        let mut collections = self.lock();
        Self::check_writable(&collections, collection, id)?;
        let doc = collections
            .documents
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| Error::not_found(format!("{}/{}", collection, id)))?;
        for (key, value) in fields {
            doc.data.insert(key, value);
        }
        self.publish(&collections, collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.lock();
        Self::check_writable(&collections, collection, id)?;
        let removed = match collections.documents.get_mut(collection) {
            Some(docs) => {
                let before = docs.len();
                docs.retain(|d| d.id != id);
                docs.len() != before
            }
            None => false,
        };
        if removed {
            self.publish(&collections, collection);
        }
        Ok(())
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        let collections = self.lock();
        Ok(collections
            .documents
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned())
    }
}
