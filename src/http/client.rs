//! JSON-over-HTTP client
//!
//! Every call is a POST of a JSON body to a path under one endpoint root.
//! Each attempt waits for the rate limiter, sends once and classifies the
//! outcome as an [`Error`]; [`retry`] decides whether to go again.

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::error::{Error, Result};
use crate::retry::{retry, RetryPolicy};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Seconds to wait on a 429 without a usable `Retry-After` header
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Settings shared by every request of a client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// Attempts and backoff for transient failures
    pub retry: RetryPolicy,
    /// Token bucket, if any
    pub rate_limit: Option<RateLimiterConfig>,
    /// Headers sent with every request; values are marked sensitive
    pub headers: Vec<(String, String)>,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            rate_limit: Some(RateLimiterConfig::default()),
            headers: Vec::new(),
            user_agent: format!("docflow/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for [`HttpClientConfig`]
#[derive(Debug, Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    #[must_use]
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Send `key: value` with every request
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// POSTs JSON to one endpoint with retry and rate limiting
pub struct HttpClient {
    client: Client,
    endpoint: Url,
    timeout: Duration,
    retry: RetryPolicy,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Create a client for the endpoint root `endpoint`
    pub fn new(endpoint: &str, config: HttpClientConfig) -> Result<Self> {
        let mut endpoint = Url::parse(endpoint)?;
        // Joined paths must land under the root, not replace its last segment
        if !endpoint.path().ends_with('/') {
            endpoint.set_path(&format!("{}/", endpoint.path()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .default_headers(header_map(&config.headers)?)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            timeout: config.timeout,
            retry: config.retry,
            rate_limiter: config.rate_limit.map(RateLimiter::new),
        })
    }

    /// Endpoint root every path is resolved against
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// POST `body` to `path` and parse the JSON response
    pub async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = self.endpoint.join(path.trim_start_matches('/'))?;
        let label = format!("POST {}", url.path());

        let text = retry(&self.retry, &label, |_| self.send(&url, body)).await?;
        serde_json::from_str(&text)
            .map_err(|e| Error::decode(format!("{label} returned invalid JSON: {e}")))
    }

    /// One attempt; the error says whether another is worthwhile
    async fn send(&self, url: &Url, body: &Value) -> Result<String> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire().await;
        }

        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    Error::Http(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited {
                retry_after_seconds: retry_after(&response),
            });
        }
        if status.is_client_error() || status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::http_status(status.as_u16(), text));
        }

        tracing::trace!(url = %url, status = status.as_u16(), "Request succeeded");
        Ok(response.text().await?)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| Error::invalid_value(format!("header '{key}'"), e.to_string()))?;
        let mut value = HeaderValue::from_str(value)
            .map_err(|e| Error::invalid_value(format!("header '{key}'"), e.to_string()))?;
        value.set_sensitive(true);
        map.insert(name, value);
    }
    Ok(map)
}

fn retry_after(response: &Response) -> u64 {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}
