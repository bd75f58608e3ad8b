//! HTTP fetcher implementation
//!
//! This module performs exactly one request per call:
//! - Building the HTTP client with the configured user agent and timeout
//! - GET requests returning the raw body bytes
//! - Classifying statuses and transport failures into `ErrorKind`
//!
//! It never retries and never touches shared state; retry accounting lives in
//! the `retry` module so every retry feeds the same counter.

use crate::config::ScraperConfig;
use crate::state::ErrorKind;
use reqwest::header::LAST_MODIFIED;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;

/// Result of a single fetch attempt
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// The item identifier (URL) that was requested
    pub identifier: String,

    /// Raw response body, present only for a 2xx response
    pub payload: Option<Vec<u8>>,

    /// HTTP status, if a response was received
    pub status: Option<u16>,

    /// `Last-Modified` response header, if any
    pub last_modified: Option<String>,

    /// Classified failure, if the fetch did not succeed
    pub error: Option<ErrorKind>,
}

impl FetchResult {
    /// Creates a successful result
    pub fn success(
        identifier: impl Into<String>,
        status: u16,
        payload: Vec<u8>,
        last_modified: Option<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            payload: Some(payload),
            status: Some(status),
            last_modified,
            error: None,
        }
    }

    /// Creates a failed result
    pub fn failure(identifier: impl Into<String>, status: Option<u16>, error: ErrorKind) -> Self {
        Self {
            identifier: identifier.into(),
            payload: None,
            status,
            last_modified: None,
            error: Some(error),
        }
    }

    /// Returns true if the fetch produced a payload
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Something that can fetch one page
///
/// The scheduler is generic over this trait so it can be driven by the real
/// HTTP client, by the retry decorator, or by a scripted double in tests.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, identifier: &str) -> impl Future<Output = FetchResult> + Send;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The scraper configuration (user agent and timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use page_harvest::config::ScraperConfig;
/// use page_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&ScraperConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &ScraperConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout())
        .connect_timeout(config.timeout().min(Duration::from_secs(10)))
        .pool_max_idle_per_host(config.batch_size)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a client built from the configuration
    pub fn new(config: &ScraperConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(config)?))
    }

    /// Creates a fetcher around an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, identifier: &str) -> FetchResult {
        fetch_url(&self.client, identifier).await
    }
}

/// Fetches a URL once and classifies the outcome
///
/// # Classification
///
/// | Condition | Result |
/// |-----------|--------|
/// | HTTP 2xx | payload |
/// | HTTP 5xx | `ServerError` (transient) |
/// | HTTP 4xx, other non-2xx | `ClientError` (terminal) |
/// | Timeout (connect, headers or body) | `Timeout` (transient) |
/// | Connection refused, DNS, reset, broken body | `Connection` (transient) |
/// | URL the client cannot build a request for | `ParseError` (terminal) |
pub async fn fetch_url(client: &Client, url: &str) -> FetchResult {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => return FetchResult::failure(url, None, classify_transport_error(&e)),
    };

    let status = response.status();
    if !status.is_success() {
        return FetchResult::failure(
            url,
            Some(status.as_u16()),
            ErrorKind::from_status(status.as_u16()),
        );
    }

    let last_modified = response
        .headers()
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match response.bytes().await {
        Ok(body) => FetchResult::success(url, status.as_u16(), body.to_vec(), last_modified),
        Err(e) => FetchResult::failure(url, Some(status.as_u16()), classify_transport_error(&e)),
    }
}

/// Maps a reqwest error onto the item error taxonomy
fn classify_transport_error(error: &reqwest::Error) -> ErrorKind {
    if error.is_timeout() {
        ErrorKind::Timeout
    } else if error.is_builder() {
        ErrorKind::ParseError
    } else {
        ErrorKind::Connection
    }
}
