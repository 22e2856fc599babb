//! Host APIs for CloudMon plugins.
//!
//! - [`keychain`] - OS secret store backends
//! - [`http`] - HTTP client with tracing and domain allowlist

pub mod http;
pub mod keychain;

// Re-export key types
pub use http::HttpClient;
pub use keychain::{MemoryKeychain, SecretStore, SystemKeychain};
