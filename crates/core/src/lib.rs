//! Core types and shared functionality for the pokedex data-access layer.
//!
//! This crate provides:
//! - Key-value store backends (SQLite, in-memory, no-op)
//! - The TTL store that wraps them with best-effort expiry semantics
//! - Store error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheEntry, KvStore, MemoryStore, NoopStore, TtlStore};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
