//! Zhipu API client.

use cloudmon_fetch::HttpClient;
use reqwest::header::ACCEPT;
use tracing::{debug, instrument};

use super::error::ZhipuError;
use super::parser::BalanceResponse;

/// Open platform base URL.
pub const ZHIPU_API_BASE: &str = "https://open.bigmodel.cn/api/paas/v4";

/// Balance and resource package endpoint.
const BALANCE_ENDPOINT: &str = "/users/me/balance";

/// Zhipu API client.
#[derive(Debug, Clone)]
pub struct ZhipuApiClient {
    http: HttpClient,
    base_url: String,
}

impl ZhipuApiClient {
    /// Creates a client for the public API.
    pub fn new() -> Self {
        Self::with_base_url(ZHIPU_API_BASE)
    }

    /// Creates a client against another base URL.
    pub fn with_base_url(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http: HttpClient::for_base_urls(&[base_url.as_str()]),
            base_url,
        }
    }

    /// Fetches the balance and resource packages.
    ///
    /// An error object in a successful response is returned as
    /// [`ZhipuError::Api`].
    #[instrument(skip(self, api_key))]
    pub async fn fetch_balance(&self, api_key: &str) -> Result<BalanceResponse, ZhipuError> {
        let url = format!("{}{}", self.base_url, BALANCE_ENDPOINT);
        let request = self
            .http
            .get(&url)?
            .bearer_auth(api_key)
            .header(ACCEPT, "application/json");
        let mut response: BalanceResponse = self.http.send_json(request).await?;
        if let Some(error) = response.error.take() {
            return Err(ZhipuError::Api {
                code: error.code(),
                message: error.message,
            });
        }
        debug!(packages = response.packages.len(), "Fetched Zhipu balance");
        Ok(response)
    }
}

impl Default for ZhipuApiClient {
    fn default() -> Self {
        Self::new()
    }
}
