//! GCP plugin.

use async_trait::async_trait;
use chrono::Utc;
use cloudmon_core::{
    AccountContext, CredentialBundle, Payload, ProviderDescriptor, ProviderError, ProviderPlugin,
    QueryKind,
};
use tracing::{debug, instrument};

use super::api::{GcpApiClient, QUERY_TIMEOUT_MS};
use super::auth::ServiceAccountKey;
use super::descriptor::{gcp_descriptor, BIGQUERY_TABLE, SERVICE_ACCOUNT_JSON};
use super::error::GcpError;
use super::parser::{billing_query, billing_summary, cost_payload, table_project};
use crate::format::invoice_month;

/// GCP plugin: billing export in BigQuery.
#[derive(Debug, Clone, Default)]
pub struct GcpPlugin {
    api: GcpApiClient,
}

impl GcpPlugin {
    /// Creates a plugin for the public Google endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a plugin against another base URL.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            api: GcpApiClient::with_base_url(base_url),
        }
    }

    async fn fetch_cost(&self, key: &ServiceAccountKey, table: &str) -> Result<Payload, GcpError> {
        // Jobs run in the service account's project; the export may live elsewhere.
        let project = match key.project_id.as_deref() {
            Some(project) => project,
            None => table_project(table)?,
        };
        let month = invoice_month(Utc::now());

        let token = self.api.fetch_token(key).await?;
        let body = billing_query(table, &month, QUERY_TIMEOUT_MS);
        let response = self.api.run_query(&token, project, &body).await?;
        let summary = billing_summary(&response)?;
        Ok(cost_payload(&summary, &month))
    }
}

async fn load_credentials(
    secrets: &CredentialBundle,
) -> Result<(ServiceAccountKey, &str), ProviderError> {
    let raw_key = secrets.require(SERVICE_ACCOUNT_JSON)?;
    let table = secrets.require(BIGQUERY_TABLE)?.trim();
    table_project(table)?;
    let key = ServiceAccountKey::load(raw_key).await?;
    Ok((key, table))
}

#[async_trait]
impl ProviderPlugin for GcpPlugin {
    fn identify(&self) -> ProviderDescriptor {
        gcp_descriptor()
    }

    #[instrument(skip(self, secrets), fields(account = %account.account_id))]
    async fn fetch(
        &self,
        account: &AccountContext,
        query: QueryKind,
        secrets: &CredentialBundle,
    ) -> Result<Payload, ProviderError> {
        if query != QueryKind::Cost {
            return Err(ProviderError::UnsupportedQuery(query));
        }
        let (key, table) = load_credentials(secrets).await?;
        Ok(self.fetch_cost(&key, table).await?)
    }

    /// Obtains a token; table access is checked on the first fetch.
    #[instrument(skip(self, secrets), fields(account = %account.account_id))]
    async fn validate_credentials(
        &self,
        account: &AccountContext,
        secrets: &CredentialBundle,
    ) -> Result<(), ProviderError> {
        let (key, _) = load_credentials(secrets).await?;
        self.api.fetch_token(&key).await?;
        debug!(client_email = %key.client_email, "GCP service account accepted");
        Ok(())
    }
}
