//! Azure plugin.

use async_trait::async_trait;
use cloudmon_core::{
    AccountContext, CredentialBundle, Payload, ProviderDescriptor, ProviderError, ProviderPlugin,
    QueryKind,
};
use tracing::{debug, instrument};

use super::api::{AzureApiClient, ServicePrincipal};
use super::descriptor::{azure_descriptor, CLIENT_ID, CLIENT_SECRET, SUBSCRIPTION_ID, TENANT_ID};
use super::parser::{cost_payload, virtual_machines, vms_payload};

/// Azure plugin: Cost Management and Compute.
#[derive(Debug, Clone, Default)]
pub struct AzurePlugin {
    api: AzureApiClient,
}

impl AzurePlugin {
    /// Creates a plugin for the public Azure cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a plugin against another base URL.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            api: AzureApiClient::with_base_url(base_url),
        }
    }
}

fn principal(secrets: &CredentialBundle) -> Result<ServicePrincipal<'_>, ProviderError> {
    Ok(ServicePrincipal {
        tenant_id: secrets.require(TENANT_ID)?,
        client_id: secrets.require(CLIENT_ID)?,
        client_secret: secrets.require(CLIENT_SECRET)?,
    })
}

#[async_trait]
impl ProviderPlugin for AzurePlugin {
    fn identify(&self) -> ProviderDescriptor {
        azure_descriptor()
    }

    #[instrument(skip(self, secrets), fields(account = %account.account_id))]
    async fn fetch(
        &self,
        account: &AccountContext,
        query: QueryKind,
        secrets: &CredentialBundle,
    ) -> Result<Payload, ProviderError> {
        if query == QueryKind::Quota {
            return Err(ProviderError::UnsupportedQuery(query));
        }
        let principal = principal(secrets)?;
        let subscription_id = secrets.require(SUBSCRIPTION_ID)?;
        let token = self.api.fetch_token(principal).await?;

        match query {
            QueryKind::Cost => {
                let response = self.api.query_cost(&token, subscription_id).await?;
                Ok(cost_payload(&response))
            }
            QueryKind::InstanceList => {
                let vms = self.api.list_virtual_machines(&token, subscription_id).await?;
                Ok(vms_payload(&virtual_machines(&vms)))
            }
            QueryKind::Quota => Err(ProviderError::UnsupportedQuery(query)),
        }
    }

    /// Obtains a token; the subscription itself is checked on the first fetch.
    #[instrument(skip(self, secrets), fields(account = %account.account_id))]
    async fn validate_credentials(
        &self,
        account: &AccountContext,
        secrets: &CredentialBundle,
    ) -> Result<(), ProviderError> {
        let principal = principal(secrets)?;
        secrets.require(SUBSCRIPTION_ID)?;
        self.api.fetch_token(principal).await?;
        debug!("Azure service principal accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_subscription_is_reported_before_any_call() {
        let plugin = AzurePlugin::with_base_url("http://127.0.0.1:9");
        let secrets = CredentialBundle::new()
            .with(TENANT_ID, "t")
            .with(CLIENT_ID, "c")
            .with(CLIENT_SECRET, "s");
        let err = plugin
            .validate_credentials(&AccountContext::new("azure", "main"), &secrets)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::MissingCredential(SUBSCRIPTION_ID.to_string()));
    }

    #[tokio::test]
    async fn test_quota_is_unsupported() {
        let plugin = AzurePlugin::new();
        let err = plugin
            .fetch(&AccountContext::new("azure", "main"), QueryKind::Quota, &CredentialBundle::new())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::UnsupportedQuery(QueryKind::Quota));
    }
}
