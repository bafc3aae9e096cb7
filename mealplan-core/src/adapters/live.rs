//! Live query hub shared by the document store adapters
//!
//! Each subscription owns a `watch` channel. After every commit the owning
//! store publishes the collection's documents and the hub recomputes each
//! affected subscription's filtered snapshot. Stores publish while holding
//! their write lock, so snapshots reach a subscriber in commit order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::ports::document_store::{matches_all, Filter, LiveQuery, StoredDocument};

struct Subscriber {
    collection: String,
    filters: Vec<Filter>,
    sender: watch::Sender<Vec<StoredDocument>>,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

/// Registry of active live queries
#[derive(Clone, Default)]
pub struct LiveQueryHub {
    state: Arc<Mutex<HubState>>,
}

impl LiveQueryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription whose first snapshot is taken from `documents`
    pub fn register(
        &self,
        collection: &str,
        filters: Vec<Filter>,
        documents: &[StoredDocument],
    ) -> LiveQuery {
        let initial = filter_documents(&filters, documents);
        let (sender, receiver) = watch::channel(initial);

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(
            id,
            Subscriber {
                collection: collection.to_string(),
                filters,
                sender,
            },
        );
        drop(state);

        tracing::debug!(collection, subscription = id, "live query registered");

        let weak = Arc::downgrade(&self.state);
        LiveQuery::new(receiver, move || {
            if let Some(state) = weak.upgrade() {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.subscribers.remove(&id).is_some() {
                    tracing::debug!(subscription = id, "live query released");
                }
            }
        })
    }

    /// Whether anything is listening on `collection`
    pub fn has_subscribers(&self, collection: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .subscribers
            .values()
            .any(|s| s.collection == collection)
    }

    /// Number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.subscribers.len()
    }

    /// Push fresh snapshots of `collection` to its subscribers
    ///
    /// Subscribers whose filtered view did not change are not woken.
    pub fn publish(&self, collection: &str, documents: &[StoredDocument]) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for subscriber in state.subscribers.values() {
            if subscriber.collection != collection {
                continue;
            }
            let snapshot = filter_documents(&subscriber.filters, documents);
            subscriber.sender.send_if_modified(|current| {
                if *current == snapshot {
                    false
                } else {
                    *current = snapshot;
                    true
                }
            });
        }
    }
}

fn filter_documents(filters: &[Filter], documents: &[StoredDocument]) -> Vec<StoredDocument> {
    documents
        .iter()
        .filter(|d| matches_all(filters, &d.data))
        .cloned()
        .collect()
}
