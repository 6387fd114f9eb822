//! Client code for pokedex.
//!
//! This crate provides the resilient fetch pipeline, the cache-aside layer on
//! top of it, the bounded worker pool, and the typed catalog queries used by
//! the CLI.

pub mod cache_aside;
pub mod catalog;
pub mod fetch;
pub mod pool;

pub use cache_aside::CacheAside;
pub use catalog::{CatalogClient, ListCursor, NamedResource, Page, Pokemon, TypeDetails};
pub use fetch::{CachePolicy, CancelToken, ErrorKind, FetchClient, FetchConfig, FetchError, FetchResponse, RequestSpec};
pub use pool::{FilterJob, PoolSummary, WorkerPool};
