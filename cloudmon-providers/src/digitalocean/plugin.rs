//! DigitalOcean plugin.

use async_trait::async_trait;
use cloudmon_core::{
    AccountContext, CredentialBundle, Payload, ProviderDescriptor, ProviderError, ProviderPlugin,
    QueryKind,
};
use tracing::{debug, instrument, warn};

use super::api::DigitalOceanApiClient;
use super::descriptor::{digitalocean_descriptor, API_TOKEN};
use super::error::DigitalOceanError;
use super::parser::{cost_payload, droplets_payload};

/// Billing records requested alongside the balance.
const HISTORY_PAGE: u32 = 5;

/// DigitalOcean plugin: balance, billing history, droplets.
#[derive(Debug, Clone, Default)]
pub struct DigitalOceanPlugin {
    api: DigitalOceanApiClient,
}

impl DigitalOceanPlugin {
    /// Creates a plugin for the public API.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a plugin against another base URL.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            api: DigitalOceanApiClient::with_base_url(base_url),
        }
    }

    async fn fetch_cost(&self, token: &str) -> Result<Payload, DigitalOceanError> {
        let balance = self.api.fetch_balance(token).await?;

        // History is decoration; the balance alone is a valid answer.
        let history = match self.api.fetch_billing_history(token, HISTORY_PAGE).await {
            Ok(history) => history.billing_history,
            Err(e) => {
                warn!(error = %e, "Billing history unavailable");
                Vec::new()
            }
        };

        cost_payload(&balance, &history)
    }
}

#[async_trait]
impl ProviderPlugin for DigitalOceanPlugin {
    fn identify(&self) -> ProviderDescriptor {
        digitalocean_descriptor()
    }

    #[instrument(skip(self, secrets), fields(account = %account.account_id))]
    async fn fetch(
        &self,
        account: &AccountContext,
        query: QueryKind,
        secrets: &CredentialBundle,
    ) -> Result<Payload, ProviderError> {
        let token = secrets.require(API_TOKEN)?;
        match query {
            QueryKind::Cost => Ok(self.fetch_cost(token).await?),
            QueryKind::InstanceList => {
                let droplets = self.api.fetch_droplets(token).await?;
                Ok(droplets_payload(&droplets))
            }
            QueryKind::Quota => Err(ProviderError::UnsupportedQuery(query)),
        }
    }

    #[instrument(skip(self, secrets), fields(account = %account.account_id))]
    async fn validate_credentials(
        &self,
        account: &AccountContext,
        secrets: &CredentialBundle,
    ) -> Result<(), ProviderError> {
        let token = secrets.require(API_TOKEN)?;
        let response = self.api.fetch_account(token).await?;
        debug!(status = ?response.account.status, "DigitalOcean token accepted");
        Ok(())
    }
}
