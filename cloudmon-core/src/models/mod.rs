//! Domain models for CloudMon.
//!
//! ## Submodules
//!
//! - [`provider`] - Provider types (ProviderId, QueryKind, ProviderDescriptor)
//! - [`account`] - Account types (AccountContext, AccountKey)
//! - [`fetch`] - Fetch results (CacheKey, FetchResult, Payload, FetchFailure)
//! - [`secret`] - Redacting secret wrappers (SecretValue, CredentialBundle)

pub mod account;
pub mod fetch;
pub mod provider;
pub mod secret;

// Re-export everything at the models level
pub use account::{AccountContext, AccountKey};
pub use fetch::{CacheKey, FailureKind, FetchFailure, FetchResult, Metric, MetricStatus, Payload};
pub use provider::{
    CredentialField, ProviderDescriptor, ProviderDescriptorBuilder, ProviderId, QueryKind,
    DEFAULT_POLL_INTERVAL,
};
pub use secret::{CredentialBundle, SecretValue};
