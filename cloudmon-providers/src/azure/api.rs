//! Azure API client.
//!
//! Every call first exchanges the service principal's secret for an ARM
//! bearer token. Tokens are not cached between calls.

use cloudmon_fetch::HttpClient;
use reqwest::RequestBuilder;
use serde_json::json;
use tracing::{debug, instrument, warn};

use super::error::AzureError;
use super::parser::{QueryResponse, TokenResponse, VirtualMachine, VirtualMachineList};

// ============================================================================
// Constants
// ============================================================================

/// Entra ID login endpoint.
pub const LOGIN_BASE: &str = "https://login.microsoftonline.com";

/// Azure Resource Manager endpoint.
pub const MANAGEMENT_BASE: &str = "https://management.azure.com";

/// Token scope for Azure Resource Manager.
const ARM_SCOPE: &str = "https://management.azure.com/.default";

/// Cost Management API version.
const COST_API_VERSION: &str = "2023-03-01";

/// Compute API version.
const COMPUTE_API_VERSION: &str = "2024-03-01";

/// VM listing pages followed before giving up.
const MAX_VM_PAGES: usize = 10;

/// Service principal credentials.
#[derive(Clone, Copy)]
pub struct ServicePrincipal<'a> {
    /// Entra ID tenant.
    pub tenant_id: &'a str,
    /// Application id.
    pub client_id: &'a str,
    /// Client secret.
    pub client_secret: &'a str,
}

impl std::fmt::Debug for ServicePrincipal<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

// ============================================================================
// API Client
// ============================================================================

/// Azure API client.
#[derive(Debug, Clone)]
pub struct AzureApiClient {
    http: HttpClient,
    login_base: String,
    management_base: String,
}

impl AzureApiClient {
    /// Creates a client for the public Azure cloud.
    pub fn new() -> Self {
        Self {
            http: HttpClient::for_base_urls(&[LOGIN_BASE, MANAGEMENT_BASE]),
            login_base: LOGIN_BASE.to_string(),
            management_base: MANAGEMENT_BASE.to_string(),
        }
    }

    /// Serves both login and management from one base URL (tests, proxies).
    pub fn with_base_url(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http: HttpClient::for_base_urls(&[base_url.as_str()]),
            login_base: base_url.clone(),
            management_base: base_url,
        }
    }

    /// Exchanges the client secret for an ARM bearer token.
    #[instrument(skip(self, principal), fields(tenant = %principal.tenant_id))]
    pub async fn fetch_token(&self, principal: ServicePrincipal<'_>) -> Result<String, AzureError> {
        debug!("Requesting Azure access token");

        let url = format!("{}/{}/oauth2/v2.0/token", self.login_base, principal.tenant_id);
        let request = self.http.post(&url)?.form(&[
            ("grant_type", "client_credentials"),
            ("client_id", principal.client_id),
            ("client_secret", principal.client_secret),
            ("scope", ARM_SCOPE),
        ]);

        let token: TokenResponse = self
            .http
            .send_json(request)
            .await
            .map_err(AzureError::from_token_failure)?;
        debug!(expires_in = ?token.expires_in, "Azure token issued");
        Ok(token.access_token)
    }

    fn management(&self, path: &str, api_version: &str) -> String {
        format!("{}{path}?api-version={api_version}", self.management_base)
    }

    fn authorized(request: RequestBuilder, token: &str) -> RequestBuilder {
        request.bearer_auth(token)
    }

    /// Queries month-to-date actual cost grouped by resource group.
    #[instrument(skip(self, token))]
    pub async fn query_cost(
        &self,
        token: &str,
        subscription_id: &str,
    ) -> Result<QueryResponse, AzureError> {
        debug!("Querying Azure Cost Management");

        let url = self.management(
            &format!("/subscriptions/{subscription_id}/providers/Microsoft.CostManagement/query"),
            COST_API_VERSION,
        );
        let body = json!({
            "type": "ActualCost",
            "timeframe": "MonthToDate",
            "dataset": {
                "granularity": "None",
                "aggregation": {
                    "totalCost": {"name": "Cost", "function": "Sum"}
                },
                "grouping": [{"type": "Dimension", "name": "ResourceGroup"}]
            }
        });
        let request = Self::authorized(self.http.post(&url)?, token).json(&body);

        let response: QueryResponse = self.http.send_json(request).await?;
        if response.properties.next_link.is_some() {
            debug!(rows = response.properties.rows.len(), "Cost query is paged, using first page");
        }
        Ok(response)
    }

    /// Lists every VM in the subscription with its power state.
    #[instrument(skip(self, token))]
    pub async fn list_virtual_machines(
        &self,
        token: &str,
        subscription_id: &str,
    ) -> Result<Vec<VirtualMachine>, AzureError> {
        debug!("Listing Azure virtual machines");

        let mut url = format!(
            "{}&statusOnly=true",
            self.management(
                &format!("/subscriptions/{subscription_id}/providers/Microsoft.Compute/virtualMachines"),
                COMPUTE_API_VERSION,
            )
        );
        let mut vms = Vec::new();
        for _ in 0..MAX_VM_PAGES {
            let request = Self::authorized(self.http.get(&url)?, token);
            let page: VirtualMachineList = self.http.send_json(request).await?;
            vms.extend(page.value);
            match page.next_link {
                Some(next) => url = next,
                None => return Ok(vms),
            }
        }
        warn!(count = vms.len(), "VM listing truncated after {MAX_VM_PAGES} pages");
        Ok(vms)
    }
}

impl Default for AzureApiClient {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
