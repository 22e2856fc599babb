//! Account types.
//!
//! An [`AccountContext`] is one configured subscription/credential set for a
//! provider. It only ever references the vault; secret values live there.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::provider::ProviderId;

/// Characters that would make vault keys or cache keys ambiguous.
const RESERVED_CHARS: &[char] = &[':', '/'];

// ============================================================================
// Account Key
// ============================================================================

/// Identifies one account of one provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountKey {
    /// Provider id.
    pub provider_id: ProviderId,
    /// Account id, unique per provider.
    pub account_id: String,
}

impl AccountKey {
    /// Creates an account key.
    pub fn new(provider_id: impl Into<ProviderId>, account_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            account_id: account_id.into(),
        }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.account_id)
    }
}

// ============================================================================
// Account Context
// ============================================================================

/// One configured account for a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    /// Provider id.
    pub provider_id: ProviderId,
    /// Account id, unique per provider.
    pub account_id: String,
    /// User-facing alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Region override (e.g. `eu-west-1`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Polling interval override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    /// Whether the scheduler polls this account.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl AccountContext {
    /// Creates an enabled account with no overrides.
    pub fn new(provider_id: impl Into<ProviderId>, account_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            account_id: account_id.into(),
            label: None,
            region: None,
            poll_interval_secs: None,
            enabled: true,
        }
    }

    /// Sets the user-facing alias.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the region override.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the polling interval override.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_secs = Some(interval.as_secs().max(1));
        self
    }

    /// Returns the key identifying this account.
    pub fn key(&self) -> AccountKey {
        AccountKey::new(self.provider_id.clone(), self.account_id.clone())
    }

    /// Returns the polling interval override, if any.
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs.map(Duration::from_secs)
    }

    /// Returns the alias, falling back to the account id.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.account_id)
    }

    /// Returns the vault key prefix for this account's credentials.
    pub fn credential_ref(&self) -> String {
        format!("{}:{}", self.provider_id, self.account_id)
    }

    /// Checks that ids are usable as vault and cache key components.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidId`] when an id is empty or contains
    /// `:` or `/`.
    pub fn validate(&self) -> Result<(), CoreError> {
        for id in [self.provider_id.as_str(), self.account_id.as_str()] {
            if id.trim().is_empty() || id.contains(RESERVED_CHARS) {
                return Err(CoreError::InvalidId(id.to_string()));
            }
        }
        Ok(())
    }
}
