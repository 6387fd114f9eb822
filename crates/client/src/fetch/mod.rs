//! Resilient HTTP fetch pipeline.
//!
//! One logical GET per call, with:
//!
//! ### Timeouts
//! - Every attempt runs under its own timer (default: 8s). When it elapses the
//!   in-flight request is dropped and the attempt counts as a timeout.
//!
//! ### Retry
//! - Up to `max_retries` extra attempts (default: 3), strictly sequential.
//! - 5xx responses, timeouts and transient transport failures are retried.
//! - 4xx responses fail immediately.
//! - Between attempts: `2^attempt * 1s + uniform(0, 500ms)`.
//!
//! ### Cancellation
//! - An optional [`CancelToken`] aborts the current attempt or backoff wait and
//!   fails the call with [`FetchError::Cancelled`], whatever retry budget remains.

pub mod backoff;
pub mod cancel;
pub mod error;
pub mod request;
pub mod url;

use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use std::time::{Duration, Instant};

pub use backoff::Backoff;
pub use cancel::CancelToken;
pub use error::{ErrorKind, FetchError, NetworkErrorKind};
pub use request::{CachePolicy, RequestSpec};
pub use url::{UrlError, cache_key, canonicalize, endpoint};

use cancel::wait_cancelled;
use pokedex_core::AppConfig;

/// Longest 4xx body echoed back in a client error message.
const MAX_ERROR_MESSAGE: usize = 200;

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "pokedex/0.1")
    pub user_agent: String,

    /// Per-attempt timeout (default: 8s)
    pub timeout: Duration,

    /// Retries after the first attempt (default: 3)
    pub max_retries: u32,

    /// Delay schedule between attempts
    pub backoff: Backoff,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "pokedex/0.1".to_string(),
            timeout: Duration::from_millis(8000),
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
            max_retries: config.max_retries,
            backoff: Backoff::new(config.backoff_base(), config.backoff_jitter()),
        }
    }
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL requested
    pub url: String,
    /// HTTP status code
    pub status: StatusCode,
    /// Response body bytes
    pub bytes: Bytes,
    /// Attempts used, including the successful one
    pub attempts: u32,
    /// Wall time across all attempts and backoff waits, in milliseconds
    pub fetch_ms: u64,
}

/// HTTP client with timeout, retry and cancellation handling.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| FetchError::Config(e.to_string()))?;

        Ok(Self { http, config })
    }

    /// Fetch `spec.url`, retrying retryable failures.
    ///
    /// Cache-unaware: `spec.policy` is ignored here.
    pub async fn fetch(&self, spec: &RequestSpec) -> Result<FetchResponse, FetchError> {
        let start = Instant::now();
        let url = spec.url.as_str();
        let timeout = spec.timeout.unwrap_or(self.config.timeout);
        let max_retries = spec.max_retries.unwrap_or(self.config.max_retries);

        let mut attempt: u32 = 0;
        loop {
            if spec.is_cancelled() {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }

            match self.attempt(spec, timeout).await {
                Ok((status, bytes)) => {
                    let fetch_ms = start.elapsed().as_millis() as u64;
                    tracing::debug!(url, attempts = attempt + 1, fetch_ms, bytes = bytes.len(), "fetched");
                    return Ok(FetchResponse { url: url.to_string(), status, bytes, attempts: attempt + 1, fetch_ms });
                }
                Err(err) if err.is_retryable() => {
                    if attempt >= max_retries {
                        return Err(FetchError::Exhausted {
                            url: url.to_string(),
                            attempts: attempt + 1,
                            last: Box::new(err),
                        });
                    }

                    let delay = self.config.backoff.delay(attempt);
                    tracing::warn!(
                        url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );

                    tokio::select! {
                        biased;
                        _ = wait_cancelled(spec.cancel.as_ref()) => {
                            return Err(FetchError::Cancelled { url: url.to_string() });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Fetch and parse the body as JSON.
    pub async fn fetch_json(&self, spec: &RequestSpec) -> Result<serde_json::Value, FetchError> {
        let response = self.fetch(spec).await?;
        serde_json::from_slice(&response.bytes)
            .map_err(|e| FetchError::Decode { url: response.url, reason: e.to_string() })
    }

    /// One attempt, raced against the timeout and the cancellation token.
    async fn attempt(&self, spec: &RequestSpec, timeout: Duration) -> Result<(StatusCode, Bytes), FetchError> {
        let url = spec.url.as_str();
        let request = self
            .http
            .request(spec.method.clone(), spec.url.clone())
            .header(header::ACCEPT, "application/json")
            .headers(spec.headers.clone());

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| classify_transport(url, e, timeout))?;

            let status = response.status();
            if status.is_client_error() {
                let body = response.text().await.unwrap_or_default();
                return Err(FetchError::Client {
                    url: url.to_string(),
                    status: status.as_u16(),
                    message: client_message(status, &body),
                });
            }
            if status.is_server_error() {
                return Err(FetchError::Server { url: url.to_string(), status: status.as_u16() });
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| classify_transport(url, e, timeout))?;
            Ok((status, bytes))
        };

        tokio::select! {
            biased;
            _ = wait_cancelled(spec.cancel.as_ref()) => {
                tracing::debug!(url, "request cancelled");
                Err(FetchError::Cancelled { url: url.to_string() })
            }
            result = tokio::time::timeout(timeout, exchange) => match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::debug!(url, timeout_ms = timeout.as_millis() as u64, "attempt timed out");
                    Err(FetchError::Timeout { url: url.to_string(), after: timeout })
                }
            },
        }
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

fn classify_transport(url: &str, err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout { url: url.to_string(), after: timeout }
    } else {
        FetchError::from_reqwest(url, err)
    }
}

fn client_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status.canonical_reason().unwrap_or("client error").to_string();
    }
    body.chars().take(MAX_ERROR_MESSAGE).collect()
}
