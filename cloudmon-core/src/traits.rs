//! Trait definitions for CloudMon.
//!
//! This module defines the contract every provider plugin implements.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::models::{AccountContext, CredentialBundle, Payload, ProviderDescriptor, QueryKind};

/// Contract implemented by every cloud provider integration.
///
/// Implementors are responsible for:
/// - Describing themselves (id, capabilities, credential fields)
/// - Performing the network calls for one query per `fetch` (no internal retries)
/// - Translating SDK/HTTP errors into [`ProviderError`]
///
/// Plugins hold no per-account mutable state, so one instance serves all
/// accounts of its provider concurrently.
#[async_trait]
pub trait ProviderPlugin: Send + Sync {
    /// Returns static metadata. Must not perform I/O.
    fn identify(&self) -> ProviderDescriptor;

    /// Fetches one query kind for one account.
    ///
    /// `secrets` is resolved from the vault for this call only.
    async fn fetch(
        &self,
        account: &AccountContext,
        query: QueryKind,
        secrets: &CredentialBundle,
    ) -> Result<Payload, ProviderError>;

    /// Performs a cheap authentication/connectivity check.
    async fn validate_credentials(
        &self,
        account: &AccountContext,
        secrets: &CredentialBundle,
    ) -> Result<(), ProviderError>;
}
