//! Gemini plugin.

use async_trait::async_trait;
use cloudmon_core::{
    AccountContext, CredentialBundle, Payload, ProviderDescriptor, ProviderError, ProviderPlugin,
    QueryKind,
};
use tracing::instrument;

use super::api::GeminiApiClient;
use super::descriptor::{gemini_descriptor, API_KEY};
use super::parser::quota_payload;

/// Gemini plugin: model availability and token limits.
#[derive(Debug, Clone, Default)]
pub struct GeminiPlugin {
    api: GeminiApiClient,
}

impl GeminiPlugin {
    /// Creates a plugin for the public API.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a plugin against another base URL.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            api: GeminiApiClient::with_base_url(base_url),
        }
    }
}

#[async_trait]
impl ProviderPlugin for GeminiPlugin {
    fn identify(&self) -> ProviderDescriptor {
        gemini_descriptor()
    }

    #[instrument(skip(self, secrets), fields(account = %account.account_id))]
    async fn fetch(
        &self,
        account: &AccountContext,
        query: QueryKind,
        secrets: &CredentialBundle,
    ) -> Result<Payload, ProviderError> {
        if query != QueryKind::Quota {
            return Err(ProviderError::UnsupportedQuery(query));
        }
        let api_key = secrets.require(API_KEY)?;
        let models = self.api.fetch_models(api_key).await?;
        Ok(quota_payload(&models))
    }

    #[instrument(skip(self, secrets), fields(account = %account.account_id))]
    async fn validate_credentials(
        &self,
        account: &AccountContext,
        secrets: &CredentialBundle,
    ) -> Result<(), ProviderError> {
        let api_key = secrets.require(API_KEY)?;
        self.api.fetch_models_page(api_key, None).await?;
        Ok(())
    }
}
