//! Configuration document.
//!
//! `config.json` holds the manager settings and the configured accounts.
//! It never contains secret values; those live in the credential vault.

use std::path::Path;
use std::time::Duration;

use cloudmon_core::{AccountContext, AccountKey};
use cloudmon_fetch::RetryPolicy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::persistence::{load_json, save_json};

// ============================================================================
// Manager Settings
// ============================================================================

/// Tunables for the plugin manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// TTL for cached results, in seconds.
    pub default_ttl_secs: u64,
    /// Lower bound for any polling interval, in seconds.
    pub min_poll_interval_secs: u64,
    /// Deadline for one plugin `fetch` call, in seconds.
    pub fetch_timeout_secs: u64,
    /// Deadline for `validate_credentials`, in seconds.
    pub validation_timeout_secs: u64,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Per-subscriber event queue capacity.
    pub event_capacity: usize,
    /// Re-publish cached results when a scheduled tick finds them fresh.
    pub publish_on_cache_hit: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 600,
            min_poll_interval_secs: 60,
            fetch_timeout_secs: 30,
            validation_timeout_secs: 15,
            retry: RetryPolicy::default(),
            event_capacity: 256,
            publish_on_cache_hit: false,
        }
    }
}

impl ManagerConfig {
    /// Cached result TTL.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Minimum polling interval.
    pub fn min_poll_interval(&self) -> Duration {
        Duration::from_secs(self.min_poll_interval_secs)
    }

    /// Deadline for one fetch attempt.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Deadline for credential validation.
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }

    /// Checks the settings for values the manager cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.fetch_timeout_secs == 0 {
            return Err(StoreError::Config("fetch_timeout_secs must be > 0".into()));
        }
        if self.validation_timeout_secs == 0 {
            return Err(StoreError::Config("validation_timeout_secs must be > 0".into()));
        }
        if self.event_capacity == 0 {
            return Err(StoreError::Config("event_capacity must be > 0".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Config File
// ============================================================================

/// The persisted configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Manager settings.
    #[serde(default)]
    pub manager: ManagerConfig,
    /// Configured accounts.
    #[serde(default)]
    pub accounts: Vec<AccountContext>,
}

impl ConfigFile {
    /// Loads the document, returning defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Fails if the file is unreadable, malformed, or holds invalid values.
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        let config: Self = match load_json(path).await {
            Ok(config) => config,
            Err(e) if e.is_not_found() => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };

        config.manager.validate()?;
        for account in &config.accounts {
            account
                .validate()
                .map_err(|e| StoreError::Config(e.to_string()))?;
        }
        info!(path = %path.display(), accounts = config.accounts.len(), "Loaded config");
        Ok(config)
    }

    /// Saves the document with 0600 permissions.
    ///
    /// # Errors
    ///
    /// Fails on serialization or I/O errors.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        save_json(path, self).await
    }

    /// Returns the account with the given key.
    pub fn account(&self, key: &AccountKey) -> Option<&AccountContext> {
        self.accounts.iter().find(|a| &a.key() == key)
    }

    /// Inserts an account, replacing one with the same key.
    pub fn upsert_account(&mut self, account: AccountContext) {
        match self.accounts.iter_mut().find(|a| a.key() == account.key()) {
            Some(existing) => *existing = account,
            None => self.accounts.push(account),
        }
    }

    /// Removes an account, returning it if present.
    pub fn remove_account(&mut self, key: &AccountKey) -> Option<AccountContext> {
        let idx = self.accounts.iter().position(|a| &a.key() == key)?;
        Some(self.accounts.remove(idx))
    }
}
