//! Best-effort TTL store.
//!
//! Entries are serialized as `{stored_at, payload}` and written as one value.
//! An entry is live while `now - stored_at <= ttl`; anything older is treated
//! as absent and deleted on read.
//!
//! Caching is an optimization, so no method here returns an error: write,
//! read, delete and clear failures are logged and swallowed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::store::KvStore;
use crate::Error;

/// Default time-to-live for cached responses (30 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// A cached payload with the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry<T> {
    /// Unix epoch milliseconds at write time.
    pub stored_at: i64,
    pub payload: T,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T) -> Self {
        Self { stored_at: Utc::now().timestamp_millis(), payload }
    }

    /// Age of the entry relative to `now_ms`. Entries from the future count as age zero.
    fn age(&self, now_ms: i64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.stored_at).max(0) as u64)
    }

    pub fn is_live(&self, ttl: Duration, now_ms: i64) -> bool {
        self.age(now_ms) <= ttl
    }
}

impl<T: Serialize> CacheEntry<T> {
    fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl<T: DeserializeOwned> CacheEntry<T> {
    fn decode(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// TTL wrapper around a shared [`KvStore`] backend.
#[derive(Clone)]
pub struct TtlStore {
    backend: Arc<dyn KvStore>,
    ttl: Duration,
}

impl std::fmt::Debug for TtlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlStore").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TtlStore {
    /// Wrap `backend` with the default 30 minute TTL.
    pub fn new(backend: Arc<dyn KvStore>) -> Self {
        Self { backend, ttl: DEFAULT_TTL }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value` under `key`, stamped with the current time.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) {
        let bytes = match CacheEntry::new(value).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache entry not serializable, skipping write");
                return;
            }
        };

        if let Err(e) = self.backend.set(key, bytes).await {
            tracing::warn!(key, error = %e, "cache write failed, continuing without cache");
        }
    }

    /// Read the live value under `key`.
    ///
    /// Returns `None` when the key is missing, expired, unreadable or doesn't
    /// decode as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let entry = match CacheEntry::<T>::decode(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(key, error = %e, "undecodable cache entry, treating as miss");
                return None;
            }
        };

        if !entry.is_live(self.ttl, Utc::now().timestamp_millis()) {
            // Conditional so a refresh landing after our read survives.
            match self.backend.delete_if(key, &bytes).await {
                Ok(true) => tracing::debug!(key, "expired cache entry removed"),
                Ok(false) => tracing::debug!(key, "expired cache entry already replaced"),
                Err(e) => tracing::debug!(key, error = %e, "failed to delete expired cache entry"),
            }
            return None;
        }

        Some(entry.payload)
    }

    /// Wipe every entry. Maintenance/debug only.
    pub async fn clear(&self) {
        match self.backend.clear().await {
            Ok(()) => tracing::info!("cache cleared"),
            Err(e) => tracing::error!(error = %e, "failed to clear cache"),
        }
    }
}
