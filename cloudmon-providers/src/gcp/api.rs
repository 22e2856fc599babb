//! Google Cloud API client.

use chrono::Utc;
use cloudmon_fetch::HttpClient;
use serde_json::Value;
use tracing::{debug, instrument};

use super::auth::{signed_assertion, ServiceAccountKey, TokenResponse, BIGQUERY_SCOPE, JWT_BEARER_GRANT};
use super::error::GcpError;
use super::parser::QueryResponse;

// ============================================================================
// Constants
// ============================================================================

/// BigQuery REST base URL.
pub const BIGQUERY_BASE: &str = "https://bigquery.googleapis.com";

/// Domain every Google endpoint used here lives under.
const GOOGLE_DOMAIN: &str = "googleapis.com";

/// Server-side wait for the query, kept below the HTTP timeout.
pub const QUERY_TIMEOUT_MS: u64 = 20_000;

// ============================================================================
// API Client
// ============================================================================

/// Google Cloud API client.
#[derive(Debug, Clone)]
pub struct GcpApiClient {
    http: HttpClient,
    bigquery_base: String,
    token_uri_override: Option<String>,
}

impl GcpApiClient {
    /// Creates a client for the public Google endpoints.
    pub fn new() -> Self {
        Self {
            http: HttpClient::with_allowed_domains(vec![GOOGLE_DOMAIN.to_string()]),
            bigquery_base: BIGQUERY_BASE.to_string(),
            token_uri_override: None,
        }
    }

    /// Serves the token endpoint (`/token`) and BigQuery from one base URL.
    pub fn with_base_url(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http: HttpClient::for_base_urls(&[base_url.as_str()]),
            token_uri_override: Some(format!("{base_url}/token")),
            bigquery_base: base_url,
        }
    }

    /// Exchanges a signed assertion for a BigQuery access token.
    #[instrument(skip(self, key), fields(client_email = %key.client_email))]
    pub async fn fetch_token(&self, key: &ServiceAccountKey) -> Result<String, GcpError> {
        let token_uri = self.token_uri_override.as_deref().unwrap_or(&key.token_uri);
        debug!(token_uri, "Requesting Google access token");

        let assertion = signed_assertion(key, BIGQUERY_SCOPE, token_uri, Utc::now())?;
        let request = self
            .http
            .post(token_uri)?
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())]);

        let token: TokenResponse = self
            .http
            .send_json(request)
            .await
            .map_err(GcpError::from_token_failure)?;
        debug!(expires_in = ?token.expires_in, "Google token issued");
        Ok(token.access_token)
    }

    /// Runs a synchronous BigQuery query billed to `project`.
    #[instrument(skip(self, token, body))]
    pub async fn run_query(
        &self,
        token: &str,
        project: &str,
        body: &Value,
    ) -> Result<QueryResponse, GcpError> {
        debug!("Running BigQuery query");
        let url = format!("{}/bigquery/v2/projects/{project}/queries", self.bigquery_base);
        let request = self.http.post(&url)?.bearer_auth(token).json(body);
        Ok(self.http.send_json(request).await?)
    }
}

impl Default for GcpApiClient {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
