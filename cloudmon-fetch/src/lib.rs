// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # CloudMon Fetch
//!
//! Host APIs shared by provider plugins and the plugin manager.
//!
//! ## Host APIs
//!
//! The [`host`] module provides abstractions for system interactions:
//!
//! - [`host::keychain`] - OS secret store backends ([`SecretStore`])
//! - [`host::http`] - HTTP client with tracing, domain allowlist, and
//!   translation of HTTP failures into [`cloudmon_core::ProviderError`]
//!
//! ## Credential Vault
//!
//! [`CredentialVault`] is the only path to secrets. It keys values by
//! provider, account, and field, serializes writes per key, and never keeps
//! a secret in memory after returning it.
//!
//! ## Retry
//!
//! [`RetryPolicy`] describes the bounded exponential backoff the plugin
//! manager applies to transient fetch failures.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cloudmon_fetch::{CredentialVault, SystemKeychain};
//!
//! let vault = CredentialVault::new(Arc::new(SystemKeychain::new()));
//! vault.store(&"aws".into(), "prod", "access_key_id", "AKIA...").await?;
//! let key = vault.retrieve(&"aws".into(), "prod", "access_key_id").await?;
//! ```

pub mod error;
pub mod host;
pub mod retry;
pub mod vault;

// Errors
pub use error::{HttpError, KeychainError, VaultError};

// Host APIs
pub use host::{
    http::{HttpClient, ResponseExt},
    keychain::{MemoryKeychain, SecretStore, SystemKeychain},
};

// Vault & retry
pub use retry::RetryPolicy;
pub use vault::{CredentialVault, MAX_CHUNK_BYTES, SERVICE_NAME};
