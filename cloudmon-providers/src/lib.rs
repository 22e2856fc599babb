// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `CloudMon` Providers
//!
//! Cloud provider plugins for `CloudMon`.
//!
//! Each provider module implements [`cloudmon_core::ProviderPlugin`] and
//! includes:
//!
//! - **Descriptor**: Static metadata, capabilities, and credential fields
//! - **API client**: Raw wire calls through [`cloudmon_fetch::HttpClient`]
//! - **Parser**: Response parsing into a [`cloudmon_core::Payload`]
//! - **Error**: Provider errors translated into
//!   [`cloudmon_core::ProviderError`]
//!
//! ## Supported Providers
//!
//! | Provider | Cost | Quota | Instances | Auth |
//! |----------|------|-------|-----------|------|
//! | AWS | ✅ | ❌ | ✅ | Access key (SigV4) |
//! | Azure | ✅ | ❌ | ✅ | Service principal |
//! | GCP | ✅ | ❌ | ❌ | Service account (BigQuery export) |
//! | DigitalOcean | ✅ | ❌ | ✅ | API token |
//! | Gemini | ❌ | ✅ | ❌ | API key |
//! | Zhipu | ✅ | ✅ | ❌ | API key |
//!
//! ## Usage
//!
//! ```ignore
//! use cloudmon_providers::ProviderRegistry;
//!
//! for plugin in ProviderRegistry::builtin() {
//!     manager.register_plugin(plugin)?;
//! }
//! ```

pub mod format;
pub mod instances;
pub mod registry;

// Provider modules (alphabetical)
pub mod aws;
pub mod azure;
pub mod digitalocean;
pub mod gcp;
pub mod gemini;
pub mod zhipu;

pub use registry::ProviderRegistry;

// Re-export provider descriptors
pub use aws::aws_descriptor;
pub use azure::azure_descriptor;
pub use digitalocean::digitalocean_descriptor;
pub use gcp::gcp_descriptor;
pub use gemini::gemini_descriptor;
pub use zhipu::zhipu_descriptor;

// Re-export plugin types
pub use aws::AwsPlugin;
pub use azure::AzurePlugin;
pub use digitalocean::DigitalOceanPlugin;
pub use gcp::GcpPlugin;
pub use gemini::GeminiPlugin;
pub use zhipu::ZhipuPlugin;

#[cfg(test)]
mod plugin_tests;
