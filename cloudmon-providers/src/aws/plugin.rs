//! AWS plugin.

use async_trait::async_trait;
use chrono::Utc;
use cloudmon_core::{
    AccountContext, CredentialBundle, Payload, ProviderDescriptor, ProviderError, ProviderPlugin,
    QueryKind,
};
use tracing::{debug, instrument};

use super::api::{AwsApiClient, DEFAULT_REGION};
use super::descriptor::{aws_descriptor, ACCESS_KEY_ID, REGION, SECRET_ACCESS_KEY, SESSION_TOKEN};
use super::parser::{cost_payload, instances_payload};
use super::sigv4::AwsCredentials;
use crate::format::month_to_date;

/// AWS plugin: Cost Explorer and EC2.
#[derive(Debug, Clone, Default)]
pub struct AwsPlugin {
    api: AwsApiClient,
}

impl AwsPlugin {
    /// Creates a plugin for the public endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends every call to one endpoint.
    pub fn with_endpoint(endpoint: &str) -> Self {
        Self {
            api: AwsApiClient::with_endpoint(endpoint),
        }
    }
}

fn credentials(secrets: &CredentialBundle) -> Result<AwsCredentials<'_>, ProviderError> {
    Ok(AwsCredentials {
        access_key_id: secrets.require(ACCESS_KEY_ID)?,
        secret_access_key: secrets.require(SECRET_ACCESS_KEY)?,
        session_token: secrets.get(SESSION_TOKEN),
    })
}

/// The account's region wins over the stored credential.
fn region<'a>(account: &'a AccountContext, secrets: &'a CredentialBundle) -> &'a str {
    account
        .region
        .as_deref()
        .or_else(|| secrets.get(REGION))
        .unwrap_or(DEFAULT_REGION)
}

#[async_trait]
impl ProviderPlugin for AwsPlugin {
    fn identify(&self) -> ProviderDescriptor {
        aws_descriptor()
    }

    #[instrument(skip(self, secrets), fields(account = %account.account_id))]
    async fn fetch(
        &self,
        account: &AccountContext,
        query: QueryKind,
        secrets: &CredentialBundle,
    ) -> Result<Payload, ProviderError> {
        let credentials = credentials(secrets)?;
        match query {
            QueryKind::Cost => {
                let (start, end) = month_to_date(Utc::now());
                let response = self.api.get_cost_and_usage(credentials, start, end).await?;
                Ok(cost_payload(&response))
            }
            QueryKind::InstanceList => {
                let region = region(account, secrets);
                let instances = self.api.describe_instances(credentials, region).await?;
                Ok(instances_payload(&instances, region))
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
        let identity = self.api.get_caller_identity(credentials(secrets)?).await?;
        debug!(aws_account = %identity.account, "AWS credentials accepted");
        Ok(())
    }
}
