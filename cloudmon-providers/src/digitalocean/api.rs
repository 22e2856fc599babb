//! DigitalOcean API client.

use cloudmon_fetch::HttpClient;
use reqwest::header::ACCEPT;
use reqwest::RequestBuilder;
use tracing::{debug, instrument};

use super::error::DigitalOceanError;
use super::parser::{AccountResponse, BalanceResponse, BillingHistoryResponse, DropletsResponse};

// ============================================================================
// Constants
// ============================================================================

/// DigitalOcean API base URL.
pub const DO_API_BASE: &str = "https://api.digitalocean.com";

/// Balance endpoint.
const BALANCE_ENDPOINT: &str = "/v2/customers/my/balance";

/// Billing history endpoint.
const BILLING_HISTORY_ENDPOINT: &str = "/v2/customers/my/billing_history";

/// Droplet listing endpoint.
const DROPLETS_ENDPOINT: &str = "/v2/droplets";

/// Account endpoint, used for credential validation.
const ACCOUNT_ENDPOINT: &str = "/v2/account";

/// Largest page the droplet listing accepts.
const DROPLETS_PER_PAGE: u32 = 200;

// ============================================================================
// API Client
// ============================================================================

/// DigitalOcean API client.
#[derive(Debug, Clone)]
pub struct DigitalOceanApiClient {
    http: HttpClient,
    base_url: String,
}

impl DigitalOceanApiClient {
    /// Creates a client for the public API.
    pub fn new() -> Self {
        Self::with_base_url(DO_API_BASE)
    }

    /// Creates a client against another base URL (tests, proxies).
    pub fn with_base_url(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http: HttpClient::for_base_urls(&[base_url.as_str()]),
            base_url,
        }
    }

    fn get(&self, endpoint: &str, token: &str) -> Result<RequestBuilder, DigitalOceanError> {
        let url = format!("{}{}", self.base_url, endpoint);
        Ok(self
            .http
            .get(&url)?
            .bearer_auth(token)
            .header(ACCEPT, "application/json"))
    }

    /// Fetches the month-to-date balance.
    #[instrument(skip(self, token))]
    pub async fn fetch_balance(&self, token: &str) -> Result<BalanceResponse, DigitalOceanError> {
        debug!("Fetching DigitalOcean balance");
        let request = self.get(BALANCE_ENDPOINT, token)?;
        Ok(self.http.send_json(request).await?)
    }

    /// Fetches the most recent billing records.
    #[instrument(skip(self, token))]
    pub async fn fetch_billing_history(
        &self,
        token: &str,
        per_page: u32,
    ) -> Result<BillingHistoryResponse, DigitalOceanError> {
        debug!("Fetching DigitalOcean billing history");
        let request = self
            .get(BILLING_HISTORY_ENDPOINT, token)?
            .query(&[("per_page", per_page)]);
        Ok(self.http.send_json(request).await?)
    }

    /// Lists droplets (first page of up to 200).
    #[instrument(skip(self, token))]
    pub async fn fetch_droplets(&self, token: &str) -> Result<DropletsResponse, DigitalOceanError> {
        debug!("Fetching DigitalOcean droplets");
        let request = self
            .get(DROPLETS_ENDPOINT, token)?
            .query(&[("per_page", DROPLETS_PER_PAGE)]);
        Ok(self.http.send_json(request).await?)
    }

    /// Fetches the account, the cheapest authenticated call.
    #[instrument(skip(self, token))]
    pub async fn fetch_account(&self, token: &str) -> Result<AccountResponse, DigitalOceanError> {
        debug!("Fetching DigitalOcean account");
        let request = self.get(ACCOUNT_ENDPOINT, token)?;
        Ok(self.http.send_json(request).await?)
    }
}

impl Default for DigitalOceanApiClient {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
