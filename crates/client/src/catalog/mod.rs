//! Typed catalog queries over the cache-aside layer.
//!
//! ### Endpoints
//!
//! - `GET {base}/pokemon?limit={limit}&offset={offset}`: paginated listing
//! - `GET {base}/pokemon/{name_or_id}`: detail; the identifier is lowercased
//! - `GET {base}/type/{name}`: members of one category
//! - `GET {base}/type?limit=18`: the category list
//!
//! Every query is cache-first except the per-member detail fetches behind
//! [`CatalogClient::filter_by_category`], which bypass the cache so a large
//! category doesn't flood it with entries nobody asked for.

pub mod cursor;
pub mod types;

pub use cursor::ListCursor;
pub use types::{NamedResource, Page, Pokemon, TypeDetails, TypeMember};

use std::sync::Arc;

use pokedex_core::{AppConfig, CacheDb, KvStore, NoopStore, TtlStore};
use url::Url;

use crate::cache_aside::CacheAside;
use crate::fetch::{CachePolicy, CancelToken, FetchClient, FetchConfig, FetchError, RequestSpec, canonicalize};
use crate::pool::{FilterJob, WorkerPool};

/// Number of primary categories requested by [`CatalogClient::categories`].
const CATEGORY_LIMIT: u32 = 18;

#[derive(Clone)]
pub struct CatalogClient {
    cache: CacheAside,
    base_url: String,
    pool: WorkerPool,
}

impl CatalogClient {
    pub fn new(cache: CacheAside, base_url: impl Into<String>) -> Self {
        Self { cache, base_url: base_url.into(), pool: WorkerPool::default() }
    }

    /// Build the full stack from configuration.
    ///
    /// A cache database that can't be opened downgrades to no caching; only
    /// an unusable HTTP client is an error.
    pub async fn from_config(config: &AppConfig) -> Result<Self, FetchError> {
        let backend: Arc<dyn KvStore> = if !config.cache_enabled {
            tracing::debug!("cache disabled by configuration");
            Arc::new(NoopStore)
        } else {
            match CacheDb::open(&config.db_path).await {
                Ok(db) => Arc::new(db),
                Err(e) => {
                    tracing::warn!(path = %config.db_path.display(), error = %e, "cache unavailable, continuing without it");
                    Arc::new(NoopStore)
                }
            }
        };

        let store = TtlStore::new(backend).with_ttl(config.cache_ttl());
        let fetcher = FetchClient::new(FetchConfig::from(config))?;
        let client = Self::new(CacheAside::new(fetcher, store), config.base_url.clone())
            .with_pool(WorkerPool::new(config.pool_concurrency));
        Ok(client)
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn cache(&self) -> &CacheAside {
        &self.cache
    }

    /// One page of the listing.
    pub async fn list(&self, limit: u32, offset: u32) -> Result<Page, FetchError> {
        let mut url = self.url_for(&["pokemon"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        self.cache.query_as(RequestSpec::get(url)).await
    }

    /// Detail lookup by name or numeric id.
    ///
    /// `cancel` lets the caller abandon a lookup that has been superseded
    /// (e.g. a newer search query); the result is then [`FetchError::Cancelled`].
    pub async fn detail(&self, name_or_id: &str, cancel: Option<CancelToken>) -> Result<Pokemon, FetchError> {
        let mut spec = RequestSpec::get(self.detail_url(name_or_id)?);
        if let Some(token) = cancel {
            spec = spec.with_cancel(token);
        }
        self.cache.query_as(spec).await
    }

    /// Members of one category.
    pub async fn by_category(&self, name: &str) -> Result<TypeDetails, FetchError> {
        let name = normalize_name(name)?;
        let url = self.url_for(&["type", &name])?;
        self.cache.query_as(RequestSpec::get(url)).await
    }

    /// The primary categories.
    pub async fn categories(&self) -> Result<Vec<NamedResource>, FetchError> {
        let mut url = self.url_for(&["type"])?;
        url.query_pairs_mut().append_pair("limit", &CATEGORY_LIMIT.to_string());
        let page: Page = self.cache.query_as(RequestSpec::get(url)).await?;
        Ok(page.results)
    }

    /// Fetch full details for every member of a category through the worker pool.
    ///
    /// Fails only if the category itself can't be fetched. Member lookups that
    /// fail are logged and skipped; the rest stream out of the returned job as
    /// they complete.
    pub async fn filter_by_category(&self, name: &str) -> Result<FilterJob<Pokemon>, FetchError> {
        let members = self.by_category(name).await?.member_names();
        tracing::info!(category = name, members = members.len(), workers = self.pool.concurrency(), "filtering by category");

        let catalog = self.clone();
        Ok(self.pool.run(members, move |member: String| {
            let catalog = catalog.clone();
            async move {
                let spec = RequestSpec::get(catalog.detail_url(&member)?).with_policy(CachePolicy::Bypass);
                catalog.cache.query_as::<Pokemon>(spec).await
            }
        }))
    }

    /// Drop every cached response.
    pub async fn clear_cache(&self) {
        self.cache.store().clear().await;
    }

    fn detail_url(&self, name_or_id: &str) -> Result<Url, FetchError> {
        let name = normalize_name(name_or_id)?;
        self.url_for(&["pokemon", &name])
    }

    /// Base URL with `segments` appended as percent-encoded path segments.
    fn url_for(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = canonicalize(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|()| FetchError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn normalize_name(raw: &str) -> Result<String, FetchError> {
    let name = raw.trim().to_lowercase();
    if name.is_empty() {
        return Err(FetchError::InvalidUrl("empty resource name".to_string()));
    }
    Ok(name)
}
