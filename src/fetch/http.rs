//! HTTP client for page assets

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::FetchConfig;
use crate::retry::{Classify, FailureClass};

/// Wait used when a 429 carries no usable `Retry-After`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("page timed out after {0:?}")]
    Timeout(Duration),

    #[error("page is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
}

impl Classify for FetchError {
    fn classify(&self) -> FailureClass {
        match self {
            FetchError::Request(_) | FetchError::Timeout(_) => FailureClass::Transient,
            FetchError::RateLimited(wait) => FailureClass::RateLimited(*wait),
            FetchError::Status { status, .. } if *status >= 500 || *status == 408 => {
                FailureClass::Transient
            }
            FetchError::Status { .. } | FetchError::TooLarge { .. } => FailureClass::Fatal,
        }
    }
}

/// Anything that can turn a page locator into bytes
#[async_trait]
pub trait AssetClient: Send + Sync {
    async fn get(&self, locator: &str) -> Result<Bytes, FetchError>;
}

/// Build the shared reqwest client used by sources and page downloads
pub fn build_http_client(config: &FetchConfig) -> Result<Client, FetchError> {
    Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .user_agent(&config.user_agent)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| FetchError::Request(e.to_string()))
}

/// Page downloader over reqwest; one attempt per call, retries live in the caller
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetClient for HttpClient {
    async fn get(&self, locator: &str) -> Result<Bytes, FetchError> {
        debug!(url = locator, "Starting page download");

        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let wait = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(FetchError::RateLimited(wait));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: locator.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(format!("Failed to read body: {e}")))?;

        debug!(url = locator, size = bytes.len(), "Page download completed");

        Ok(bytes)
    }
}

/// `Retry-After` in its delta-seconds form
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
