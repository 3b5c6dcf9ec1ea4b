//! SQLite storage layer for Courier.
//!
//! Provides:
//! - Schema initialization and connection pragmas
//! - Pooled connections shared by readers and writers
//! - Write transactions holding the database write lock from `BEGIN`

pub mod schema;
pub mod store;

pub use store::{NotificationStore, StoreError, StoreTransaction};
