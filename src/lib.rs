//! Courier: a notification service core with cache-aside reads and
//! lock-guarded cache rebuilds.
//!
//! SQLite is the source of truth. A cache (in-process or Redis) holds
//! per-notification snapshots and a bounded "recent" set, and an event bus
//! carries CREATE/UPDATE/DELETE events. Cache and bus updates happen after
//! commit on a background fan-out queue and never fail a committed write.
//!
//! # Architecture
//!
//! - **Cache-aside reads**: cache first, store on miss, repopulate off the response path
//! - **Lock-guarded rebuilds**: double-checked locking around the recent-list rebuild
//! - **Transactional writes**: exclusive-lock read, mutate, commit, then fan out
//! - **Observable**: structured tracing and OpenTelemetry metrics
//!
//! # Modules
//!
//! - [`app`]: Component wiring and shutdown
//! - [`cache`]: Cache store trait with in-memory and Redis backends
//! - [`config`]: CLI and environment configuration
//! - [`events`]: Event publisher trait, broadcast bus and logging consumer
//! - [`fanout`]: Bounded background queue for post-commit work
//! - [`model`]: Notification entity, requests and events
//! - [`observability`]: Metrics and tracing setup
//! - [`service`]: The consistency orchestrator
//! - [`storage`]: SQLite persistence layer

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // cache::CacheStore is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes, // r#""# is fine for SQL
    clippy::struct_excessive_bools,     // Config structs may have flags
    clippy::too_many_lines              // Some functions are inherently long
)]

pub mod app;
pub mod cache;
pub mod config;
pub mod events;
pub mod fanout;
pub mod model;
pub mod observability;
pub mod service;
pub mod storage;

use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable) token for lock ownership.
///
/// # Example
///
/// ```
/// let token = courier::generate_lock_token();
/// assert!(token.len() == 36); // UUID string format
/// ```
#[must_use]
pub fn generate_lock_token() -> String {
    Uuid::now_v7().to_string()
}

/// Get the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is set before the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
