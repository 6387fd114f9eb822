//! Per-call request description.

use std::time::Duration;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::cancel::CancelToken;

/// How a query interacts with the TTL store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Serve a live entry immediately and refresh it in the background;
    /// on a miss, fetch and store. (`allowCache = true`)
    #[default]
    CacheFirst,
    /// Skip the read, store on success. Used by background refreshes.
    Refresh,
    /// Skip the read and never store. (`allowCache = false`)
    Bypass,
}

impl CachePolicy {
    pub fn from_allow_cache(allow_cache: bool) -> Self {
        if allow_cache { CachePolicy::CacheFirst } else { CachePolicy::Bypass }
    }

    pub fn reads(self) -> bool {
        matches!(self, CachePolicy::CacheFirst)
    }

    pub fn writes(self) -> bool {
        !matches!(self, CachePolicy::Bypass)
    }
}

/// One logical query: where to go, how long to wait, how often to retry.
///
/// `timeout` and `max_retries` fall back to the fetch client's configuration
/// when unset.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub url: Url,
    pub method: Method,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub headers: HeaderMap,
    pub cancel: Option<CancelToken>,
    pub policy: CachePolicy,
}

impl RequestSpec {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            timeout: None,
            max_retries: None,
            headers: HeaderMap::new(),
            cancel: None,
            policy: CachePolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn allow_cache(self, allow: bool) -> Self {
        self.with_policy(CachePolicy::from_allow_cache(allow))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}
