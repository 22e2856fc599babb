//! Manager error types.

use cloudmon_core::{AccountKey, CoreError, ProviderError, ProviderId, QueryKind};
use cloudmon_fetch::VaultError;
use thiserror::Error;

/// Errors returned by the [`crate::PluginManager`] API.
///
/// Fetch failures never appear here; they travel inside
/// [`cloudmon_core::FetchResult`] and `FetchFailed` events.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// A plugin with this id is already registered.
    #[error("Provider already registered: {0}")]
    DuplicateProvider(ProviderId),

    /// No plugin is registered under this id.
    #[error("Unknown provider: {0}")]
    UnknownProvider(ProviderId),

    /// The account is not registered.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountKey),

    /// The account is already registered.
    #[error("Account already exists: {0}")]
    DuplicateAccount(AccountKey),

    /// The account ids cannot be used as vault or cache keys.
    #[error("Invalid account: {0}")]
    InvalidAccount(#[from] CoreError),

    /// `validate_credentials` rejected the account. Nothing was committed.
    #[error("Credential validation failed for {account}: {source}")]
    CredentialValidation {
        /// Account being added.
        account: AccountKey,
        /// Plugin error.
        #[source]
        source: ProviderError,
    },

    /// The provider does not support the query kind.
    #[error("Provider {provider} does not support {query}")]
    UnsupportedQuery {
        /// Provider id.
        provider: ProviderId,
        /// Requested query kind.
        query: QueryKind,
    },

    /// The credential vault failed.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl ManagerError {
    /// Returns true if the error means the user must fix credentials.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, Self::CredentialValidation { .. } | Self::Vault(_))
    }
}
