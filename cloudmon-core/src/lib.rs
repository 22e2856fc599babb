// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `CloudMon` Core
//!
//! Core types, models, and the provider plugin contract for `CloudMon`.
//!
//! This crate provides the foundational abstractions used across all other
//! `CloudMon` crates, including:
//!
//! - Domain models (providers, accounts, fetch results)
//! - The provider error taxonomy
//! - The [`ProviderPlugin`] trait every cloud integration implements
//!
//! ## Key Types
//!
//! ### Provider Types
//! - [`ProviderId`] - Unique provider identifier (`aws`, `azure`, ...)
//! - [`QueryKind`] - Category of data requested (cost, quota, instances)
//! - [`ProviderDescriptor`] - Static plugin metadata and capabilities
//! - [`CredentialField`] - A credential a plugin needs from the vault
//!
//! ### Account Types
//! - [`AccountContext`] - One configured account/subscription
//! - [`AccountKey`] - (provider, account) pair
//!
//! ### Fetch Types
//! - [`CacheKey`] - (provider, account, query kind) triple
//! - [`FetchResult`] - Immutable outcome of one plugin invocation
//! - [`Payload`] / [`Metric`] - Provider-defined structured data
//! - [`FetchFailure`] / [`FailureKind`] - Normalized failure detail
//!
//! ### Secrets
//! - [`SecretValue`] - Redacting wrapper around a credential value
//! - [`CredentialBundle`] - Resolved credentials for one fetch

pub mod error;
pub mod models;
pub mod traits;

// Re-export error types
pub use error::{CoreError, ProviderError};

// Re-export all model types
pub use models::{
    // Account types
    AccountContext,
    AccountKey,
    // Fetch types
    CacheKey,
    FailureKind,
    FetchFailure,
    FetchResult,
    Metric,
    MetricStatus,
    Payload,
    // Provider types
    CredentialField,
    ProviderDescriptor,
    ProviderDescriptorBuilder,
    ProviderId,
    QueryKind,
    // Secrets
    CredentialBundle,
    SecretValue,
};

// Re-export traits
pub use traits::ProviderPlugin;
