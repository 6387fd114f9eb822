//! Cache-aside orchestration over the fetch client.
//!
//! Decides, per query, whether to answer from the TTL store, the network, or
//! both:
//!
//! - `CacheFirst` hit: return the cached value right away and refresh the entry
//!   in a detached background task (stale-while-revalidate).
//! - `CacheFirst` miss: fetch, store, return. Concurrent misses for the same
//!   key share one in-flight request.
//! - `Refresh`: fetch and store without reading.
//! - `Bypass`: fetch only; the store is neither read nor written.
//!
//! Store failures never surface here; see [`TtlStore`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use pokedex_core::TtlStore;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::fetch::{CachePolicy, FetchClient, FetchError, RequestSpec, cache_key};

type InFlight = Shared<BoxFuture<'static, Result<Value, FetchError>>>;

/// Fetch client wrapped with cache-then-refresh semantics.
#[derive(Clone)]
pub struct CacheAside {
    fetcher: Arc<FetchClient>,
    store: TtlStore,
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
}

impl CacheAside {
    pub fn new(fetcher: FetchClient, store: TtlStore) -> Self {
        Self { fetcher: Arc::new(fetcher), store, in_flight: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn store(&self) -> &TtlStore {
        &self.store
    }

    pub fn fetcher(&self) -> &FetchClient {
        &self.fetcher
    }

    /// Run one query and decode the JSON result as `T`.
    pub async fn query_as<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T, FetchError> {
        let url = spec.url.to_string();
        let value = self.query(spec).await?;
        serde_json::from_value(value).map_err(|e| FetchError::Decode { url, reason: e.to_string() })
    }

    /// Run one query according to `spec.policy`.
    pub async fn query(&self, spec: RequestSpec) -> Result<Value, FetchError> {
        let key = cache_key(&spec.url);

        if spec.policy.reads() {
            if let Some(cached) = self.store.get::<Value>(&key).await {
                tracing::debug!(key = %key, "cache hit, refreshing in background");
                self.spawn_refresh(&spec);
                return Ok(cached);
            }
            tracing::debug!(key = %key, "cache miss");
        }

        // A token belongs to one caller; sharing its request would let that
        // caller cancel everyone else's.
        if spec.policy == CachePolicy::CacheFirst && spec.cancel.is_none() {
            return self.fetch_shared(key, spec).await;
        }

        fetch_and_store(&self.fetcher, &self.store, &key, &spec).await
    }

    /// Detached refresh of the entry behind a cache hit.
    ///
    /// Same request, `Refresh` policy, no cancellation token: the caller has
    /// already been answered. Errors are logged only.
    fn spawn_refresh(&self, spec: &RequestSpec) {
        let mut refresh = spec.clone().with_policy(CachePolicy::Refresh);
        refresh.cancel = None;

        let fetcher = Arc::clone(&self.fetcher);
        let store = self.store.clone();
        tokio::spawn(async move {
            let key = cache_key(&refresh.url);
            if let Err(e) = fetch_and_store(&fetcher, &store, &key, &refresh).await {
                tracing::warn!(key = %key, error = %e, "background refresh failed");
            }
        });
    }

    /// Join an in-flight fetch for `key`, or start one.
    ///
    /// The fetch runs on its own task, so it finishes, stores its result and
    /// leaves the registry even if every caller stops waiting.
    async fn fetch_shared(&self, key: String, spec: RequestSpec) -> Result<Value, FetchError> {
        let (shared, leader) = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            match in_flight.get(&key) {
                Some(existing) => {
                    tracing::debug!(key = %key, "joining in-flight request");
                    (existing.clone(), None)
                }
                None => {
                    let (tx, rx) = oneshot::channel();
                    let url = spec.url.to_string();
                    let fut = async move { rx.await.unwrap_or(Err(FetchError::Cancelled { url })) }.boxed().shared();
                    in_flight.insert(key.clone(), fut.clone());
                    (fut, Some(tx))
                }
            }
        };

        // Spawned outside the lock: the guard takes it again when the task ends.
        if let Some(tx) = leader {
            let fetcher = Arc::clone(&self.fetcher);
            let store = self.store.clone();
            let guard = InFlightGuard { registry: Arc::clone(&self.in_flight), key };
            tokio::spawn(async move {
                let result = fetch_and_store(&fetcher, &store, &guard.key, &spec).await;
                // Leave the registry before waking waiters so none of them sees a stale entry.
                drop(guard);
                let _ = tx.send(result);
            });
        }

        shared.await
    }

    /// Number of deduplicated requests currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }
}

/// Removes a deduplicated fetch from the registry when its task ends, panics included.
struct InFlightGuard {
    registry: Arc<Mutex<HashMap<String, InFlight>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).remove(&self.key);
    }
}

/// Fetch `spec` and, if its policy writes, store the result before returning it.
///
/// Only reached after a successful response, so a cancelled or failed attempt
/// never writes.
async fn fetch_and_store(fetcher: &FetchClient, store: &TtlStore, key: &str, spec: &RequestSpec) -> Result<Value, FetchError> {
    tracing::debug!(key, policy = ?spec.policy, "network fetch");
    let value = fetcher.fetch_json(spec).await?;
    if spec.policy.writes() {
        store.put(key, &value).await;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Backoff, CancelToken, FetchConfig, endpoint};
    use pokedex_core::{KvStore, MemoryStore};
    use serde_json::json;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn orchestrator(backend: &MemoryStore) -> CacheAside {
        let fetcher = FetchClient::new(FetchConfig {
            timeout: Duration::from_secs(5),
            max_retries: 1,
            backoff: Backoff::new(Duration::from_millis(5), Duration::ZERO),
            ..Default::default()
        })
        .unwrap();
        CacheAside::new(fetcher, TtlStore::new(Arc::new(backend.clone())))
    }

    fn spec_for(server: &MockServer, p: &str) -> RequestSpec {
        RequestSpec::get(endpoint(&server.uri(), p).unwrap())
    }

    async fn wait_for_requests(server: &MockServer, n: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            let seen = server.received_requests().await.unwrap().len();
            if seen >= n || Instant::now() > deadline {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/eevee"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "eevee"})))
            .expect(1)
            .mount(&server)
            .await;

        let backend = MemoryStore::new();
        let cache = orchestrator(&backend);
        let spec = spec_for(&server, "/pokemon/eevee");
        let key = cache_key(&spec.url);

        let value = cache.query(spec).await.unwrap();
        assert_eq!(value["name"], "eevee");
        assert_eq!(cache.store().get::<Value>(&key).await, Some(json!({"name": "eevee"})));
    }

    #[tokio::test]
    async fn test_hit_returns_without_waiting_and_refreshes_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "snorlax", "fresh": true}))
                    .set_delay(Duration::from_millis(800)),
            )
            .mount(&server)
            .await;

        let backend = MemoryStore::new();
        let cache = orchestrator(&backend);
        let spec = spec_for(&server, "/pokemon/snorlax");
        let key = cache_key(&spec.url);
        cache.store().put(&key, &json!({"name": "snorlax", "fresh": false})).await;

        let started = Instant::now();
        let value = cache.query(spec).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(value["fresh"], false);

        assert_eq!(wait_for_requests(&server, 1).await, 1);

        let deadline = Instant::now() + Duration::from_secs(3);
        while cache.store().get::<Value>(&key).await != Some(json!({"name": "snorlax", "fresh": true})) {
            assert!(Instant::now() < deadline, "refresh never landed");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_is_invisible() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let backend = MemoryStore::new();
        let cache = orchestrator(&backend);
        let spec = spec_for(&server, "/type/ghost");
        let key = cache_key(&spec.url);
        cache.store().put(&key, &json!({"id": 8})).await;

        let value = cache.query(spec).await.unwrap();
        assert_eq!(value, json!({"id": 8}));

        wait_for_requests(&server, 2).await;
        assert_eq!(cache.store().get::<Value>(&key).await, Some(json!({"id": 8})));
    }

    #[tokio::test]
    async fn test_bypass_never_writes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "mew"})))
            .expect(2)
            .mount(&server)
            .await;

        let backend = MemoryStore::new();
        let cache = orchestrator(&backend);

        cache.query(spec_for(&server, "/pokemon/mew").allow_cache(false)).await.unwrap();
        cache.query(spec_for(&server, "/pokemon/mew").allow_cache(false)).await.unwrap();

        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_bypass_ignores_live_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"v": "network"})))
            .expect(1)
            .mount(&server)
            .await;

        let backend = MemoryStore::new();
        let cache = orchestrator(&backend);
        let spec = spec_for(&server, "/pokemon/1");
        cache.store().put(&cache_key(&spec.url), &json!({"v": "cached"})).await;

        let value = cache.query(spec.allow_cache(false)).await.unwrap();
        assert_eq!(value["v"], "network");
    }

    #[tokio::test]
    async fn test_terminal_failure_on_miss_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let backend = MemoryStore::new();
        let cache = orchestrator(&backend);

        let err = cache.query(spec_for(&server, "/pokemon/missingno")).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancelled_query_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let backend = MemoryStore::new();
        let cache = orchestrator(&backend);
        let token = CancelToken::new();
        let spec = spec_for(&server, "/pokemon/abra").with_cancel(token.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let err = cache.query(spec).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "magikarp"}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = MemoryStore::new();
        let cache = orchestrator(&backend);

        let a = cache.query(spec_for(&server, "/pokemon/magikarp"));
        let b = cache.query(spec_for(&server, "/pokemon/magikarp"));
        let (a, b) = tokio::join!(a, b);

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(cache.in_flight_count(), 0);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_abandoned_miss_still_completes_and_stores() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon/gengar"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "gengar"}))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let backend = MemoryStore::new();
        let cache = orchestrator(&backend);
        let spec = spec_for(&server, "/pokemon/gengar");
        let key = cache_key(&spec.url);

        let abandoned = tokio::time::timeout(Duration::from_millis(50), cache.query(spec.clone())).await;
        assert!(abandoned.is_err());

        let deadline = Instant::now() + Duration::from_secs(3);
        while cache.in_flight_count() > 0 {
            assert!(Instant::now() < deadline, "abandoned fetch never left the registry");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(cache.store().get::<Value>(&key).await, Some(json!({"name": "gengar"})));

        let started = Instant::now();
        let value = cache.query(spec).await.unwrap();
        assert_eq!(value["name"], "gengar");
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_failing_store_degrades_to_network() {
        struct BrokenStore;

        #[async_trait::async_trait]
        impl KvStore for BrokenStore {
            async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, pokedex_core::Error> {
                Err(pokedex_core::Error::Unavailable("read".into()))
            }
            async fn set(&self, _key: &str, _value: Vec<u8>) -> Result<(), pokedex_core::Error> {
                Err(pokedex_core::Error::Unavailable("database or disk is full".into()))
            }
            async fn delete(&self, _key: &str) -> Result<(), pokedex_core::Error> {
                Err(pokedex_core::Error::Unavailable("delete".into()))
            }
            async fn delete_if(&self, _key: &str, _expected: &[u8]) -> Result<bool, pokedex_core::Error> {
                Err(pokedex_core::Error::Unavailable("delete".into()))
            }
            async fn clear(&self) -> Result<(), pokedex_core::Error> {
                Err(pokedex_core::Error::Unavailable("clear".into()))
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "onix"})))
            .expect(2)
            .mount(&server)
            .await;

        let fetcher = FetchClient::new(FetchConfig::default()).unwrap();
        let cache = CacheAside::new(fetcher, TtlStore::new(Arc::new(BrokenStore)));

        for _ in 0..2 {
            let value = cache.query(spec_for(&server, "/pokemon/onix")).await.unwrap();
            assert_eq!(value["name"], "onix");
        }
    }

    #[tokio::test]
    async fn test_query_as_decodes() {
        #[derive(serde::Deserialize)]
        struct Named {
            name: String,
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "psyduck", "id": 54})))
            .mount(&server)
            .await;

        let cache = orchestrator(&MemoryStore::new());
        let named: Named = cache.query_as(spec_for(&server, "/pokemon/psyduck")).await.unwrap();
        assert_eq!(named.name, "psyduck");

        let err = cache
            .query_as::<Vec<u32>>(spec_for(&server, "/pokemon/psyduck").allow_cache(false))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FetchError::Decode { .. }));
    }
}
