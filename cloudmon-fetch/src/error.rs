//! Fetch-layer error types.

use std::time::Duration;

use cloudmon_core::ProviderError;
use thiserror::Error;

// ============================================================================
// HTTP Error
// ============================================================================

/// HTTP-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Request error (connect, TLS, body read).
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Domain not allowed.
    #[error("Domain not allowed: {0}")]
    DomainNotAllowed(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Parsed `Retry-After` header.
        retry_after: Option<Duration>,
        /// Truncated response body.
        body: String,
    },

    /// Response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl HttpError {
    /// Returns the HTTP status, if the error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Translates HTTP failures into the provider-agnostic taxonomy.
///
/// - 401/403 are authentication failures.
/// - 408, 429, and 5xx are transient, as are connect errors and timeouts.
/// - Everything else is an invalid response.
impl From<HttpError> for ProviderError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Status {
                status,
                retry_after,
                body,
            } => match status {
                401 | 403 => ProviderError::Authentication(format!("HTTP {status}: {body}")),
                408 | 429 | 500..=599 => ProviderError::Transient {
                    message: format!("HTTP {status}: {body}"),
                    retry_after,
                },
                _ => ProviderError::InvalidResponse(format!("HTTP {status}: {body}")),
            },
            HttpError::Request(e) if e.is_timeout() || e.is_connect() => {
                ProviderError::transient(e.to_string())
            }
            HttpError::Request(e) if e.is_decode() => ProviderError::InvalidResponse(e.to_string()),
            HttpError::Request(e) => ProviderError::transient(e.to_string()),
            HttpError::Decode(msg) => ProviderError::InvalidResponse(msg),
            HttpError::DomainNotAllowed(host) => {
                ProviderError::InvalidResponse(format!("Domain not allowed: {host}"))
            }
            HttpError::InvalidUrl(msg) => ProviderError::InvalidResponse(msg),
        }
    }
}

// ============================================================================
// Keychain Error
// ============================================================================

/// Error type for secret store operations.
#[derive(Debug, Error)]
pub enum KeychainError {
    /// Credential not found.
    #[error("Credential not found for {service}/{account}")]
    NotFound {
        /// Service name.
        service: String,
        /// Account name.
        account: String,
    },

    /// Access denied (store locked or prompt refused).
    #[error("Access denied to keychain")]
    AccessDenied,

    /// Keychain unavailable.
    #[error("Keychain unavailable: {0}")]
    Unavailable(String),

    /// Platform error.
    #[error("Platform error: {0}")]
    Platform(String),

    /// Generic error.
    #[error("Keychain error: {0}")]
    Other(String),
}

impl From<keyring::Error> for KeychainError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoEntry => KeychainError::NotFound {
                service: String::new(),
                account: String::new(),
            },
            keyring::Error::Ambiguous(_) => {
                KeychainError::Other("Ambiguous credential entry".to_string())
            }
            keyring::Error::PlatformFailure(e) => KeychainError::Platform(e.to_string()),
            keyring::Error::NoStorageAccess(_) => KeychainError::AccessDenied,
            _ => KeychainError::Other(err.to_string()),
        }
    }
}

// ============================================================================
// Vault Error
// ============================================================================

/// Error type for [`crate::CredentialVault`] operations.
///
/// Messages name the vault key only. Secret values never appear here.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The OS store rejected a write.
    #[error("Failed to write credential {key}: {reason}")]
    Write {
        /// Vault key.
        key: String,
        /// Store error text.
        reason: String,
    },

    /// No value is stored under the key.
    #[error("Credential not found: {key}")]
    Miss {
        /// Vault key.
        key: String,
    },

    /// The OS store is locked or denied the read.
    #[error("Credential store unavailable for {key}: {reason}")]
    Access {
        /// Vault key.
        key: String,
        /// Store error text.
        reason: String,
    },

    /// A stored value is malformed (e.g. a chunk is missing).
    #[error("Corrupt credential {key}: {reason}")]
    Corrupt {
        /// Vault key.
        key: String,
        /// What was wrong.
        reason: String,
    },
}

impl VaultError {
    /// Returns the vault key this error concerns.
    pub fn key(&self) -> &str {
        match self {
            Self::Write { key, .. }
            | Self::Miss { key }
            | Self::Access { key, .. }
            | Self::Corrupt { key, .. } => key,
        }
    }

    /// Returns true if the value simply does not exist.
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ProviderError {
        HttpError::Status {
            status: code,
            retry_after: None,
            body: String::new(),
        }
        .into()
    }

    #[test]
    fn test_status_translation() {
        assert!(matches!(status(401), ProviderError::Authentication(_)));
        assert!(matches!(status(403), ProviderError::Authentication(_)));
        assert!(status(429).is_transient());
        assert!(status(408).is_transient());
        assert!(status(503).is_transient());
        assert!(matches!(status(404), ProviderError::InvalidResponse(_)));
        assert!(matches!(status(400), ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn test_retry_after_is_carried() {
        let err: ProviderError = HttpError::Status {
            status: 429,
            retry_after: Some(Duration::from_secs(7)),
            body: "slow down".to_string(),
        }
        .into();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_vault_error_never_formats_values() {
        let err = VaultError::Write {
            key: "aws:prod:secret_access_key".to_string(),
            reason: "locked".to_string(),
        };
        assert_eq!(err.key(), "aws:prod:secret_access_key");
        assert!(!err.is_miss());
        assert!(VaultError::Miss { key: "k".into() }.is_miss());
    }
}
