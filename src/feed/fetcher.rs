use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::Config;

/// Catalog endpoint used when the config does not override it.
pub const DEFAULT_BASE_URL: &str = "https://api.bloomlibrary.org/v1/opds";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching the catalog feed.
///
/// All of them are fatal to the run: the fetch is a single request with no
/// retry.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with a status other than 200
    #[error("HTTP error: status {status} from {url}")]
    HttpStatus { status: u16, url: String },
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the configured size limit
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The configured catalog URL could not be parsed
    #[error("Invalid catalog URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
}

/// Query parameters for one catalog request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    /// Locale of the books to list, e.g. `en-GB`.
    pub language: String,
    pub minimal_nav_links: bool,
    pub epub: bool,
    /// Adds `organizeby=language` when set.
    pub organize_by_language: bool,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            minimal_nav_links: true,
            epub: false,
            organize_by_language: false,
        }
    }
}

impl FeedQuery {
    /// Appends this query to `base`, in the order the catalog expects.
    ///
    /// Booleans go on the wire as `True` / `False`.
    pub fn apply(&self, base: &Url) -> Url {
        let mut url = base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("lang", &self.language);
            pairs.append_pair("minimalnavlinks", wire_bool(self.minimal_nav_links));
            pairs.append_pair("epub", wire_bool(self.epub));
            if self.organize_by_language {
                pairs.append_pair("organizeby", "language");
            }
        }
        url
    }
}

fn wire_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Client for the Bloom Library OPDS catalog.
///
/// Holds the HTTP client and request limits; keeps no state between calls.
#[derive(Debug, Clone)]
pub struct OpdsClient {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    max_feed_size: usize,
}

impl OpdsClient {
    /// Creates a client for `base_url` with the default timeout and size limit.
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, FetchError> {
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            timeout: DEFAULT_TIMEOUT,
            max_feed_size: DEFAULT_MAX_FEED_SIZE,
        })
    }

    /// Creates a client from the loaded configuration.
    pub fn from_config(client: reqwest::Client, config: &Config) -> Result<Self, FetchError> {
        Ok(Self::new(client, &config.base_url)?
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_max_feed_size(config.max_feed_size))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_feed_size(mut self, max_feed_size: usize) -> Self {
        self.max_feed_size = max_feed_size;
        self
    }

    /// Fetches the raw catalog feed for `query`.
    ///
    /// Issues exactly one GET. The body is returned unparsed.
    ///
    /// # Errors
    ///
    /// - [`FetchError::HttpStatus`] - any status other than 200
    /// - [`FetchError::Timeout`] - no complete response within the timeout
    /// - [`FetchError::Network`] - connection or TLS errors
    /// - [`FetchError::ResponseTooLarge`] - body exceeded the size limit
    /// - [`FetchError::IncompleteResponse`] - body shorter than Content-Length
    pub async fn fetch(&self, query: &FeedQuery) -> Result<Vec<u8>, FetchError> {
        let url = query.apply(&self.base_url);
        tracing::info!(url = %url, "Fetching OPDS catalog");

        let request = async {
            let response = self.client.get(url.clone()).send().await?;

            if response.status() != reqwest::StatusCode::OK {
                return Err(FetchError::HttpStatus {
                    status: response.status().as_u16(),
                    url: url.to_string(),
                });
            }

            read_limited_bytes(response, self.max_feed_size).await
        };

        let bytes = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;

        tracing::debug!(bytes = bytes.len(), "Fetched OPDS catalog");
        Ok(bytes)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for completeness check
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
