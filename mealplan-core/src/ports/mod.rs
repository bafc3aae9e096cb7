//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod auth;
pub mod document_store;

pub use auth::AuthProvider;
pub use document_store::{Document, DocumentStore, Filter, LiveQuery, StoredDocument};
