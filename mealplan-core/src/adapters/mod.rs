//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the DocumentStore port
//! - An in-memory DocumentStore for tests and throwaway sessions
//! - Local credentials for the AuthProvider port

pub mod duckdb;
pub mod live;
pub mod local_auth;
pub mod memory;
