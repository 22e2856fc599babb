//! Secure credential storage backends.
//!
//! [`SystemKeychain`] talks to the platform store:
//! - macOS: Keychain Services
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KDE Wallet)
//!
//! [`MemoryKeychain`] keeps entries in process memory. It backs tests and
//! headless runs where no platform store exists.
//!
//! The `keyring` calls block, so [`SystemKeychain`] runs them on the blocking
//! thread pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use keyring::Entry;
use tracing::{debug, warn};

use crate::error::KeychainError;

// ============================================================================
// Secret Store Trait
// ============================================================================

/// API for secure credential storage.
///
/// `service` scopes entries to the application; `account` is the entry name
/// inside that scope.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Get a credential.
    ///
    /// # Returns
    /// * `Ok(Some(secret))` - Credential found
    /// * `Ok(None)` - Credential not found
    /// * `Err(e)` - Error accessing the store
    async fn get(&self, service: &str, account: &str) -> Result<Option<String>, KeychainError>;

    /// Set a credential, replacing any previous value.
    async fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), KeychainError>;

    /// Delete a credential. Deleting a missing entry succeeds.
    async fn delete(&self, service: &str, account: &str) -> Result<(), KeychainError>;

    /// Check if a credential exists.
    async fn exists(&self, service: &str, account: &str) -> bool {
        matches!(self.get(service, account).await, Ok(Some(_)))
    }
}

// ============================================================================
// System Keychain Implementation
// ============================================================================

/// Default implementation using the system keychain via the `keyring` crate.
#[derive(Debug, Clone, Default)]
pub struct SystemKeychain;

impl SystemKeychain {
    /// Creates a new system keychain instance.
    pub fn new() -> Self {
        Self
    }

    /// Creates a keyring entry.
    fn entry(service: &str, account: &str) -> Result<Entry, KeychainError> {
        Entry::new(service, account).map_err(|e| KeychainError::Platform(e.to_string()))
    }

    /// Runs a blocking keyring operation off the async runtime.
    async fn blocking<T, F>(service: &str, account: &str, op: F) -> Result<T, KeychainError>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> Result<T, KeychainError> + Send + 'static,
    {
        let entry = Self::entry(service, account)?;
        tokio::task::spawn_blocking(move || op(entry))
            .await
            .map_err(|e| KeychainError::Unavailable(e.to_string()))?
    }
}

#[async_trait]
impl SecretStore for SystemKeychain {
    async fn get(&self, service: &str, account: &str) -> Result<Option<String>, KeychainError> {
        debug!(service = %service, account = %account, "Getting credential from keychain");

        let result = Self::blocking(service, account, |entry| match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        })
        .await;

        match &result {
            Ok(Some(_)) => debug!(service = %service, account = %account, "Credential found"),
            Ok(None) => debug!(service = %service, account = %account, "Credential not found"),
            Err(e) => {
                warn!(service = %service, account = %account, error = %e, "Failed to get credential");
            }
        }
        result
    }

    async fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), KeychainError> {
        debug!(service = %service, account = %account, "Setting credential in keychain");

        let secret = secret.to_string();
        Self::blocking(service, account, move |entry| {
            entry.set_password(&secret).map_err(KeychainError::from)
        })
        .await
        .inspect_err(|e| {
            warn!(service = %service, account = %account, error = %e, "Failed to set credential");
        })?;

        debug!(service = %service, account = %account, "Credential stored successfully");
        Ok(())
    }

    async fn delete(&self, service: &str, account: &str) -> Result<(), KeychainError> {
        debug!(service = %service, account = %account, "Deleting credential from keychain");

        Self::blocking(service, account, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        })
        .await
        .inspect_err(|e| {
            warn!(service = %service, account = %account, error = %e, "Failed to delete credential");
        })
    }
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// Process-local secret store.
///
/// `set_locked` makes every operation fail with [`KeychainError::AccessDenied`],
/// mimicking a locked OS keychain. `deny_writes` fails only writes,
/// `fail_write_after` rejects a single later write, and `fail_deletes_after`
/// fails deletes once a budget is spent.
#[derive(Debug, Default)]
pub struct MemoryKeychain {
    entries: Mutex<HashMap<(String, String), String>>,
    locked: AtomicBool,
    deny_writes: AtomicBool,
    write_budget: Mutex<Option<usize>>,
    delete_budget: Mutex<Option<usize>>,
}

impl MemoryKeychain {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks or unlocks the store.
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    /// Makes writes fail while reads keep working.
    pub fn deny_writes(&self, deny: bool) {
        self.deny_writes.store(deny, Ordering::SeqCst);
    }

    /// Lets `n` more writes succeed, rejects the next one, then recovers.
    pub fn fail_write_after(&self, n: usize) {
        *self
            .write_budget
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(n);
    }

    /// Lets `n` more deletes succeed, then rejects every later delete.
    pub fn fail_deletes_after(&self, n: usize) {
        *self
            .delete_budget
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(n);
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the stored entry names for a service, sorted.
    pub fn accounts(&self, service: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .keys()
            .filter(|(s, _)| s == service)
            .map(|(_, a)| a.clone())
            .collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_unlocked(&self) -> Result<(), KeychainError> {
        if self.locked.load(Ordering::SeqCst) {
            Err(KeychainError::AccessDenied)
        } else {
            Ok(())
        }
    }

    fn check_writable(&self) -> Result<(), KeychainError> {
        self.check_unlocked()?;
        if self.deny_writes.load(Ordering::SeqCst) {
            Err(KeychainError::Platform("write rejected".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SecretStore for MemoryKeychain {
    async fn get(&self, service: &str, account: &str) -> Result<Option<String>, KeychainError> {
        self.check_unlocked()?;
        Ok(self
            .lock()
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    async fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), KeychainError> {
        self.check_writable()?;
        {
            let mut budget = self
                .write_budget
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match budget.as_mut() {
                Some(0) => {
                    *budget = None;
                    return Err(KeychainError::Platform("write rejected".to_string()));
                }
                Some(left) => *left -= 1,
                None => {}
            }
        }
        self.lock()
            .insert((service.to_string(), account.to_string()), secret.to_string());
        Ok(())
    }

    async fn delete(&self, service: &str, account: &str) -> Result<(), KeychainError> {
        self.check_writable()?;
        {
            let mut budget = self
                .delete_budget
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match budget.as_mut() {
                Some(0) => return Err(KeychainError::Platform("delete rejected".to_string())),
                Some(left) => *left -= 1,
                None => {}
            }
        }
        self.lock()
            .remove(&(service.to_string(), account.to_string()));
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
