//! Key-value store backends.
//!
//! Every backend surfaces failures as `Err` instead of panicking; the
//! [`TtlStore`](super::TtlStore) above them decides what to do with those.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Error;

/// A string-keyed store of opaque byte payloads.
///
/// A `set` must replace the value for `key` as a whole unit; readers never
/// observe a partially written value.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Write `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Error>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Delete `key` only while it still holds exactly `expected`.
    ///
    /// Returns whether a row was removed. A value rewritten since `expected`
    /// was read is left alone.
    async fn delete_if(&self, key: &str, expected: &[u8]) -> Result<bool, Error>;

    /// Delete every key.
    async fn clear(&self) -> Result<(), Error>;
}

/// Process-local store backed by a `HashMap`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Error> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_if(&self, key: &str, expected: &[u8]) -> Result<bool, Error> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|current| current.as_slice() == expected) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn clear(&self) -> Result<(), Error> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// Store that doesn't keep anything.
/// Used when caching is disabled: every read misses, every write is discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

#[async_trait]
impl KvStore for NoopStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>) -> Result<(), Error> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn delete_if(&self, _key: &str, _expected: &[u8]) -> Result<bool, Error> {
        Ok(false)
    }

    async fn clear(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.set("a", b"one".to_vec()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"one".to_vec()));

        store.set("a", b"two".to_vec()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_store_delete_and_clear() {
        let store = MemoryStore::new();
        store.set("a", vec![1]).await.unwrap();
        store.set("b", vec![2]).await.unwrap();

        store.delete("a").await.unwrap();
        store.delete("missing").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.clear().await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_store_delete_if_matches_value() {
        let store = MemoryStore::new();
        store.set("k", b"stale".to_vec()).await.unwrap();
        store.set("k", b"fresh".to_vec()).await.unwrap();

        assert!(!store.delete_if("k", b"stale").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"fresh".to_vec()));

        assert!(store.delete_if("k", b"fresh").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.delete_if("k", b"fresh").await.unwrap());
    }

    #[tokio::test]
    async fn test_noop_store_always_misses() {
        let store = NoopStore;
        store.set("a", vec![1]).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }
}
