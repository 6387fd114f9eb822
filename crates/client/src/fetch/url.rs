//! Endpoint URL building and canonicalization.
//!
//! The canonical URL string doubles as the cache key, so two spellings of the
//! same request (`POKEAPI.CO`, trailing `#fragment`) must map to one key.

use url::Url;

/// Error type for URL building failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize an absolute URL.
///
/// 1. Trim whitespace
/// 2. Require http or https
/// 3. Lowercase the host (the url crate already does this for special schemes)
/// 4. Drop the fragment
/// 5. Keep the query string as-is; `offset=20&limit=20` and
///    `limit=20&offset=20` stay distinct keys
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_fragment(None);
    Ok(parsed)
}

/// Join `path` (e.g. `/pokemon?limit=20&offset=0`) onto the API base URL.
///
/// The base's own path is kept: `https://pokeapi.co/api/v2` + `/type/fire`
/// is `https://pokeapi.co/api/v2/type/fire`.
pub fn endpoint(base: &str, path: &str) -> Result<Url, UrlError> {
    let base = base.trim().trim_end_matches('/');
    let path = path.trim();
    if base.is_empty() {
        return Err(UrlError::Empty);
    }

    let joined = if path.starts_with('/') { format!("{base}{path}") } else { format!("{base}/{path}") };
    canonicalize(&joined)
}

impl From<UrlError> for super::FetchError {
    fn from(err: UrlError) -> Self {
        super::FetchError::InvalidUrl(err.to_string())
    }
}

/// The cache key for a request URL.
pub fn cache_key(url: &Url) -> String {
    url.as_str().to_string()
}
