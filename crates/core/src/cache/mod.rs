//! Local key-value persistence with expiry metadata.
//!
//! This module provides:
//!
//! - The [`KvStore`] backend trait (get/set/delete/clear keyed by string)
//! - A SQLite backend with async access via tokio-rusqlite (WAL mode, migrations)
//! - In-memory and no-op backends
//! - [`TtlStore`], the best-effort TTL wrapper every query path goes through

pub mod connection;
pub mod entries;
pub mod migrations;
pub mod store;
pub mod ttl;

pub use crate::Error;

pub use connection::CacheDb;
pub use store::{KvStore, MemoryStore, NoopStore};
pub use ttl::{CacheEntry, DEFAULT_TTL, TtlStore};
