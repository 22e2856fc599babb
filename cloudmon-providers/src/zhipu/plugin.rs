//! Zhipu plugin.

use async_trait::async_trait;
use chrono::Utc;
use cloudmon_core::{
    AccountContext, CredentialBundle, Payload, ProviderDescriptor, ProviderError, ProviderPlugin,
    QueryKind,
};
use tracing::{debug, instrument};

use super::api::ZhipuApiClient;
use super::descriptor::{zhipu_descriptor, API_KEY};
use super::parser::{balance_payload, packages_payload};

/// Zhipu plugin: account balance and resource packages.
#[derive(Debug, Clone, Default)]
pub struct ZhipuPlugin {
    api: ZhipuApiClient,
}

impl ZhipuPlugin {
    /// Creates a plugin for the public API.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a plugin against another base URL.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            api: ZhipuApiClient::with_base_url(base_url),
        }
    }
}

#[async_trait]
impl ProviderPlugin for ZhipuPlugin {
    fn identify(&self) -> ProviderDescriptor {
        zhipu_descriptor()
    }

    #[instrument(skip(self, secrets), fields(account = %account.account_id))]
    async fn fetch(
        &self,
        account: &AccountContext,
        query: QueryKind,
        secrets: &CredentialBundle,
    ) -> Result<Payload, ProviderError> {
        if query == QueryKind::InstanceList {
            return Err(ProviderError::UnsupportedQuery(query));
        }
        let api_key = secrets.require(API_KEY)?;
        let response = self.api.fetch_balance(api_key).await?;
        let now = Utc::now();
        Ok(if query == QueryKind::Quota {
            packages_payload(&response, now)
        } else {
            balance_payload(&response, now)
        })
    }

    #[instrument(skip(self, secrets), fields(account = %account.account_id))]
    async fn validate_credentials(
        &self,
        account: &AccountContext,
        secrets: &CredentialBundle,
    ) -> Result<(), ProviderError> {
        let api_key = secrets.require(API_KEY)?;
        let response = self.api.fetch_balance(api_key).await?;
        debug!(currency = response.currency(), "Zhipu API key accepted");
        Ok(())
    }
}
