//! Document store port - collection-based storage with live queries

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::watch;

use crate::domain::result::Result;

/// A document body: field name to JSON value
pub type Document = Map<String, JsonValue>;

/// A document together with its store-generated id
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

impl StoredDocument {
    pub fn new(id: impl Into<String>, data: Document) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.data.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(JsonValue::as_str)
    }
}

/// Query predicate on a single field
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`
    Eq { field: String, value: JsonValue },
    /// `field` is an array holding `value`
    ArrayContains { field: String, value: JsonValue },
    /// `field` is a map whose entry `key` equals `value`
    MapFieldEq {
        field: String,
        key: String,
        value: JsonValue,
    },
    /// `field` is absent, null or an empty string
    Missing { field: String },
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<JsonValue>) -> Self {
        Self::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn array_contains(field: &str, value: impl Into<JsonValue>) -> Self {
        Self::ArrayContains {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn map_field_eq(field: &str, key: &str, value: impl Into<JsonValue>) -> Self {
        Self::MapFieldEq {
            field: field.to_string(),
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::Missing {
            field: field.to_string(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq { field, value } => doc.get(field) == Some(value),
            Filter::ArrayContains { field, value } => match doc.get(field) {
                Some(JsonValue::Array(items)) => items.contains(value),
                _ => false,
            },
            Filter::MapFieldEq { field, key, value } => match doc.get(field) {
                Some(JsonValue::Object(map)) => map.get(key) == Some(value),
                _ => false,
            },
            Filter::Missing { field } => match doc.get(field) {
                None | Some(JsonValue::Null) => true,
                Some(JsonValue::String(s)) => s.is_empty(),
                Some(_) => false,
            },
        }
    }
}

/// Whether `doc` satisfies every filter
pub fn matches_all(filters: &[Filter], doc: &Document) -> bool {
    filters.iter().all(|f| f.matches(doc))
}

/// A live subscription to a filtered query
///
/// Holds the latest snapshot in store commit order. The subscription stays
/// registered with the store until this handle is cancelled or dropped.
pub struct LiveQuery {
    receiver: watch::Receiver<Vec<StoredDocument>>,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl LiveQuery {
    pub fn new(
        receiver: watch::Receiver<Vec<StoredDocument>>,
        cancel: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            receiver,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Latest snapshot, without marking it seen
    pub fn snapshot(&self) -> Vec<StoredDocument> {
        self.receiver.borrow().clone()
    }

    /// Latest snapshot, marking it seen
    pub fn latest(&mut self) -> Vec<StoredDocument> {
        self.receiver.borrow_and_update().clone()
    }

    /// Wait for the next snapshot. Returns false once the store has gone away.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Release the subscription
    pub fn cancel(self) {}
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("documents", &self.receiver.borrow().len())
            .finish()
    }
}

/// Document store abstraction
///
/// Implementations (adapters) provide storage, filtering and change
/// notification. Every subscription receives an initial snapshot and then a
/// fresh snapshot after each commit that touches its collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One-shot filtered read, in insertion order
    async fn query(&self, collection: &str, filters: &[Filter]) -> Result<Vec<StoredDocument>>;

    /// Long-lived filtered read
    async fn subscribe(&self, collection: &str, filters: Vec<Filter>) -> Result<LiveQuery>;

    /// Insert a document, returning its generated id
    async fn insert(&self, collection: &str, doc: Document) -> Result<String>;

    /// Merge `fields` into an existing document. Fails with NotFound if absent.
    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<()>;

    /// Delete a document. Deleting an absent document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: JsonValue) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_eq_filter() {
        let d = doc(json!({"ownerUserId": "u1"}));
        assert!(Filter::eq("ownerUserId", "u1").matches(&d));
        assert!(!Filter::eq("ownerUserId", "u2").matches(&d));
        assert!(!Filter::eq("name", "u1").matches(&d));
    }

    #[test]
    fn test_array_contains_filter() {
        let d = doc(json!({"sharedWith": ["a@x.com", "b@x.com"]}));
        assert!(Filter::array_contains("sharedWith", "a@x.com").matches(&d));
        assert!(!Filter::array_contains("sharedWith", "c@x.com").matches(&d));

        // Map-shaped sharing is not matched by array containment
        let legacy = doc(json!({"sharedWith": {"a@x.com": true}}));
        assert!(!Filter::array_contains("sharedWith", "a@x.com").matches(&legacy));
    }

    #[test]
    fn test_map_field_filter() {
        let d = doc(json!({"sharedWith": {"a@x.com": true, "b@x.com": false}}));
        assert!(Filter::map_field_eq("sharedWith", "a@x.com", true).matches(&d));
        assert!(!Filter::map_field_eq("sharedWith", "b@x.com", true).matches(&d));
    }

    #[test]
    fn test_missing_filter() {
        assert!(Filter::missing("planId").matches(&doc(json!({}))));
        assert!(Filter::missing("planId").matches(&doc(json!({"planId": null}))));
        assert!(Filter::missing("planId").matches(&doc(json!({"planId": ""}))));
        assert!(!Filter::missing("planId").matches(&doc(json!({"planId": "p1"}))));
    }

    #[test]
    fn test_live_query_cancel_runs_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = watch::channel(Vec::new());
        let counter = Arc::clone(&calls);
        let live = LiveQuery::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        live.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
