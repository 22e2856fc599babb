//! Core error types for `CloudMon`.
//!
//! [`ProviderError`] is the generic taxonomy every plugin translates its
//! SDK/HTTP failures into before returning to the plugin manager.

use std::time::Duration;

use thiserror::Error;

use crate::models::{FailureKind, QueryKind};

/// Core error type for model parsing and validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown query kind string.
    #[error("Unknown query kind: {0}")]
    UnknownQueryKind(String),

    /// Invalid identifier (empty or containing a separator).
    #[error("Invalid identifier: {0:?}")]
    InvalidId(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Provider-agnostic failure returned by plugin calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Network timeout, rate limit, or 5xx-class failure. Retried.
    #[error("Transient failure: {message}")]
    Transient {
        /// Human-readable detail.
        message: String,
        /// Server-suggested delay before retrying.
        retry_after: Option<Duration>,
    },

    /// Credentials were rejected or have expired. Not retried.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The provider answered with something we could not interpret.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A required credential field was not supplied.
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// The plugin does not support this query kind.
    #[error("Unsupported query kind: {0}")]
    UnsupportedQuery(QueryKind),
}

impl ProviderError {
    /// Creates a transient error without a retry hint.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Returns true if the manager should retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns the server-suggested retry delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Maps this error onto the serializable failure kind.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transient { .. } => FailureKind::Transient,
            Self::Authentication(_) => FailureKind::Authentication,
            Self::InvalidResponse(_) => FailureKind::InvalidResponse,
            Self::MissingCredential(_) => FailureKind::CredentialsUnavailable,
            Self::UnsupportedQuery(_) => FailureKind::Unsupported,
        }
    }
}
