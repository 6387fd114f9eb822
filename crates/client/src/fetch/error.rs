//! Fetch error taxonomy.

use std::sync::Arc;
use std::time::Duration;

/// Flat classification of a [`FetchError`], for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 4xx response.
    Client,
    /// 5xx response.
    Server,
    Timeout,
    Network,
    Cancelled,
    /// Response body wasn't the expected JSON.
    Decode,
    InvalidUrl,
    /// The client itself couldn't be built from its configuration.
    Config,
}

/// Structured cause of a transport failure, taken from the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// Could not establish a connection (DNS, refused, TLS handshake).
    Connect,
    /// Request failed after connecting (reset, protocol error).
    Request,
    /// Response body could not be read to the end.
    Body,
    Other,
}

impl NetworkErrorKind {
    fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_connect() {
            NetworkErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            NetworkErrorKind::Body
        } else if err.is_request() {
            NetworkErrorKind::Request
        } else {
            NetworkErrorKind::Other
        }
    }

    fn is_transient(self) -> bool {
        !matches!(self, NetworkErrorKind::Other)
    }
}

/// Errors from the resilient fetcher and the layers above it.
///
/// `Clone` so one in-flight result can be shared by deduplicated callers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The server rejected the request (4xx). Never retried.
    #[error("client error {status} for {url}: {message}")]
    Client { url: String, status: u16, message: String },

    /// The server failed (5xx).
    #[error("server error {status} for {url}")]
    Server { url: String, status: u16 },

    /// A single attempt exceeded its timeout.
    #[error("request to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    /// Transport failure below HTTP.
    #[error("network error ({kind:?}) for {url}: {source}")]
    Network {
        url: String,
        kind: NetworkErrorKind,
        #[source]
        source: Arc<reqwest::Error>,
    },

    /// The caller's cancellation token fired.
    #[error("request to {url} was cancelled")]
    Cancelled { url: String },

    /// Every attempt failed with a retryable error.
    #[error("failed to fetch {url} after {attempts} attempts: {last}")]
    Exhausted { url: String, attempts: u32, last: Box<FetchError> },

    /// Body was not the expected shape.
    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The HTTP client rejected its configuration (bad user agent, TLS backend).
    #[error("invalid fetch configuration: {0}")]
    Config(String),
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        FetchError::Network { url: url.to_string(), kind: NetworkErrorKind::from_reqwest(&err), source: Arc::new(err) }
    }

    /// Classification of this error. `Exhausted` reports the kind of its last attempt.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Client { .. } => ErrorKind::Client,
            FetchError::Server { .. } => ErrorKind::Server,
            FetchError::Timeout { .. } => ErrorKind::Timeout,
            FetchError::Network { .. } => ErrorKind::Network,
            FetchError::Cancelled { .. } => ErrorKind::Cancelled,
            FetchError::Exhausted { last, .. } => last.kind(),
            FetchError::Decode { .. } => ErrorKind::Decode,
            FetchError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            FetchError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether another attempt could succeed.
    ///
    /// Server errors, timeouts and transient transport failures qualify;
    /// client errors, decode errors and cancellations never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Server { .. } | FetchError::Timeout { .. } => true,
            FetchError::Network { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }

    /// Self-inflicted cancellations should be ignored, not shown to the user.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Client { status, .. } | FetchError::Server { status, .. } => Some(*status),
            FetchError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}
