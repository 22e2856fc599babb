//! HTTP client with tracing, domain allowlist, and status checking.
//!
//! This module provides a wrapped HTTP client that adds:
//! - Request/response tracing
//! - Domain allowlist so plugins only talk to their own provider
//! - Conversion of non-success statuses into [`HttpError::Status`], which
//!   in turn maps onto [`cloudmon_core::ProviderError`]

use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::HttpError;

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Longest error body kept in [`HttpError::Status`].
const MAX_ERROR_BODY: usize = 1024;

/// User agent string for CloudMon.
const USER_AGENT: &str = concat!("CloudMon/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// HTTP Client
// ============================================================================

/// HTTP client wrapper with tracing and domain allowlist.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    allowed_domains: Option<Vec<String>>,
}

impl HttpClient {
    /// Creates a new HTTP client with default settings.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a new HTTP client with a custom timeout.
    ///
    /// Falls back to reqwest's default client if the configured builder
    /// cannot be constructed.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build configured HTTP client, using defaults");
                Client::new()
            });

        Self {
            inner: client,
            allowed_domains: None,
        }
    }

    /// Creates a new HTTP client with domain allowlist.
    ///
    /// Only requests to domains in the allowlist (or their subdomains) will
    /// be permitted.
    pub fn with_allowed_domains(domains: Vec<String>) -> Self {
        Self::new().allow_domains(domains)
    }

    /// Replaces the domain allowlist.
    pub fn allow_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = Some(domains);
        self
    }

    /// Builds an allowlist from base URLs.
    pub fn for_base_urls(urls: &[&str]) -> Self {
        Self::with_allowed_domains(urls.iter().filter_map(|u| host_of(u)).collect())
    }

    /// Checks if a URL's domain is allowed.
    fn is_domain_allowed(&self, url: &str) -> Result<(), HttpError> {
        let parsed = Url::parse(url).map_err(|e| HttpError::InvalidUrl(e.to_string()))?;

        let Some(ref allowed) = self.allowed_domains else {
            return Ok(());
        };

        let host = parsed
            .host_str()
            .ok_or_else(|| HttpError::InvalidUrl("No host in URL".to_string()))?;

        let allowed = allowed
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{domain}")));

        if allowed {
            Ok(())
        } else {
            Err(HttpError::DomainNotAllowed(host.to_string()))
        }
    }

    /// Starts a request after checking the allowlist.
    ///
    /// # Errors
    ///
    /// Fails if the URL is invalid or its domain is not allowed.
    pub fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, HttpError> {
        self.is_domain_allowed(url)?;
        Ok(self.inner.request(method, url))
    }

    /// Starts a GET request.
    ///
    /// # Errors
    ///
    /// Fails if the URL is invalid or its domain is not allowed.
    pub fn get(&self, url: &str) -> Result<RequestBuilder, HttpError> {
        self.request(Method::GET, url)
    }

    /// Starts a POST request.
    ///
    /// # Errors
    ///
    /// Fails if the URL is invalid or its domain is not allowed.
    pub fn post(&self, url: &str) -> Result<RequestBuilder, HttpError> {
        self.request(Method::POST, url)
    }

    /// Sends a request and rejects non-success statuses.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Request`] for transport failures and
    /// [`HttpError::Status`] for non-2xx responses.
    #[instrument(skip_all)]
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, HttpError> {
        let response = request.send().await?;
        let status = response.status();
        debug!(status = %status, url = %response.url(), "Response received");

        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response.retry_after();
        let body = response.text().await.unwrap_or_default();
        Err(HttpError::Status {
            status: status.as_u16(),
            retry_after,
            body: truncate(&body, MAX_ERROR_BODY),
        })
    }

    /// Sends a request and decodes a JSON body.
    ///
    /// # Errors
    ///
    /// As [`HttpClient::send`], plus [`HttpError::Decode`] when the body is
    /// not the expected JSON.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, HttpError> {
        let text = self.send_text(request).await?;
        serde_json::from_str(&text).map_err(|e| HttpError::Decode(e.to_string()))
    }

    /// Sends a request and returns the body as text.
    ///
    /// # Errors
    ///
    /// As [`HttpClient::send`].
    pub async fn send_text(&self, request: RequestBuilder) -> Result<String, HttpError> {
        let response = self.send(request).await?;
        Ok(response.text().await?)
    }

    /// Returns the inner reqwest client for advanced operations.
    pub fn inner(&self) -> &Client {
        &self.inner
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the host part of a URL.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

// ============================================================================
// Response Extensions
// ============================================================================

/// Extension trait for Response handling.
pub trait ResponseExt {
    /// Check if the response indicates rate limiting.
    fn is_rate_limited(&self) -> bool;

    /// Get the `Retry-After` header value (delta-seconds form).
    fn retry_after(&self) -> Option<Duration>;
}

impl ResponseExt for Response {
    fn is_rate_limited(&self) -> bool {
        self.status() == reqwest::StatusCode::TOO_MANY_REQUESTS
    }

    fn retry_after(&self) -> Option<Duration> {
        self.headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .map(Duration::from_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
