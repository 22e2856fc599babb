//! Credential vault over an OS secret store.
//!
//! Entries are keyed `"<provider>:<account>:<field>"` under [`SERVICE_NAME`].
//! Values above [`MAX_CHUNK_BYTES`] are split across several entries:
//!
//! ```text
//! <key>:chunks     -> "3"
//! <key>:chunk:0    -> first part
//! <key>:chunk:1    -> ...
//! ```
//!
//! Writes to one key are serialized; reads never take the write lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use cloudmon_core::{AccountContext, CredentialBundle, CredentialField, ProviderId, SecretValue};
use tracing::{debug, instrument, warn};

use crate::error::{KeychainError, VaultError};
use crate::host::keychain::SecretStore;

/// Keychain service name for all CloudMon entries.
pub const SERVICE_NAME: &str = "cloudmon";

/// Largest value stored in a single entry (Windows Credential Manager limit).
pub const MAX_CHUNK_BYTES: usize = 2000;

/// Secure storage for per-account credential fields.
pub struct CredentialVault {
    store: Arc<dyn SecretStore>,
    service: String,
    write_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Creates a vault over the given backend.
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self::with_service(store, SERVICE_NAME)
    }

    /// Creates a vault with a custom keychain service name.
    pub fn with_service(store: Arc<dyn SecretStore>, service: impl Into<String>) -> Self {
        Self {
            store,
            service: service.into(),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the vault key for one credential field.
    pub fn key(provider_id: &ProviderId, account_id: &str, field: &str) -> String {
        format!("{provider_id}:{account_id}:{field}")
    }

    fn write_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    // ========================================================================
    // Single-field operations
    // ========================================================================

    /// Stores a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Write`] if the backing store rejects the write.
    #[instrument(skip(self, value))]
    pub async fn store(
        &self,
        provider_id: &ProviderId,
        account_id: &str,
        field: &str,
        value: &str,
    ) -> Result<(), VaultError> {
        let key = Self::key(provider_id, account_id, field);
        let lock = self.write_lock(&key);
        let _guard = lock.lock().await;

        let write_err = |e: KeychainError| VaultError::Write {
            key: key.clone(),
            reason: e.to_string(),
        };

        let previous_chunks = self.chunk_count(&key).await.unwrap_or(None);

        if value.len() > MAX_CHUNK_BYTES {
            let chunks = split_chunks(value, MAX_CHUNK_BYTES);
            for (idx, chunk) in chunks.iter().enumerate() {
                self.store
                    .set(&self.service, &chunk_key(&key, idx), chunk)
                    .await
                    .map_err(write_err)?;
            }
            self.store
                .set(&self.service, &marker_key(&key), &chunks.len().to_string())
                .await
                .map_err(write_err)?;
            self.store
                .delete(&self.service, &key)
                .await
                .map_err(write_err)?;
            if let Some(old) = previous_chunks {
                self.delete_chunks(&key, chunks.len(), old).await;
            }
            debug!(key = %key, chunks = chunks.len(), "Stored chunked credential");
        } else {
            self.store
                .set(&self.service, &key, value)
                .await
                .map_err(write_err)?;
            if let Some(old) = previous_chunks {
                self.store
                    .delete(&self.service, &marker_key(&key))
                    .await
                    .map_err(write_err)?;
                self.delete_chunks(&key, 0, old).await;
            }
            debug!(key = %key, "Stored credential");
        }

        Ok(())
    }

    /// Retrieves a value.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Miss`] if nothing is stored and
    /// [`VaultError::Access`] if the store refuses the read.
    #[instrument(skip(self))]
    pub async fn retrieve(
        &self,
        provider_id: &ProviderId,
        account_id: &str,
        field: &str,
    ) -> Result<SecretValue, VaultError> {
        let key = Self::key(provider_id, account_id, field);
        let access_err = |e: KeychainError| VaultError::Access {
            key: key.clone(),
            reason: e.to_string(),
        };

        if let Some(count) = self.chunk_count(&key).await.map_err(access_err)? {
            let mut value = String::new();
            for idx in 0..count {
                let chunk = self
                    .store
                    .get(&self.service, &chunk_key(&key, idx))
                    .await
                    .map_err(access_err)?
                    .ok_or_else(|| VaultError::Corrupt {
                        key: key.clone(),
                        reason: format!("chunk {idx} of {count} missing"),
                    })?;
                value.push_str(&chunk);
            }
            return Ok(SecretValue::new(value));
        }

        match self.store.get(&self.service, &key).await {
            Ok(Some(value)) => Ok(SecretValue::new(value)),
            Ok(None) | Err(KeychainError::NotFound { .. }) => Err(VaultError::Miss { key }),
            Err(e) => Err(access_err(e)),
        }
    }

    /// Deletes a value. Deleting a missing value succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Write`] if the backing store rejects the delete.
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        provider_id: &ProviderId,
        account_id: &str,
        field: &str,
    ) -> Result<(), VaultError> {
        let key = Self::key(provider_id, account_id, field);
        let lock = self.write_lock(&key);
        let _guard = lock.lock().await;

        let write_err = |e: KeychainError| VaultError::Write {
            key: key.clone(),
            reason: e.to_string(),
        };

        if let Some(count) = self.chunk_count(&key).await.map_err(write_err)? {
            self.store
                .delete(&self.service, &marker_key(&key))
                .await
                .map_err(write_err)?;
            self.delete_chunks(&key, 0, count).await;
        }
        self.store
            .delete(&self.service, &key)
            .await
            .map_err(write_err)?;

        debug!(key = %key, "Deleted credential");
        Ok(())
    }

    /// Reads the chunk marker for a key.
    async fn chunk_count(&self, key: &str) -> Result<Option<usize>, KeychainError> {
        let marker = match self.store.get(&self.service, &marker_key(key)).await {
            Ok(marker) => marker,
            Err(KeychainError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };
        Ok(marker.and_then(|m| m.trim().parse().ok()).filter(|n| *n > 0))
    }

    /// Best-effort removal of chunk entries `from..to`.
    async fn delete_chunks(&self, key: &str, from: usize, to: usize) {
        for idx in from..to {
            if let Err(e) = self.store.delete(&self.service, &chunk_key(key, idx)).await {
                warn!(key = %key, chunk = idx, error = %e, "Failed to delete stale credential chunk");
            }
        }
    }

    // ========================================================================
    // Account-level helpers
    // ========================================================================

    /// Resolves the credential fields an account's provider declares.
    ///
    /// Required fields must be present. Optional fields are skipped when
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Miss`] for a missing required field and any
    /// access error unchanged.
    pub async fn resolve(
        &self,
        account: &AccountContext,
        fields: &[CredentialField],
    ) -> Result<CredentialBundle, VaultError> {
        let mut bundle = CredentialBundle::new();
        for field in fields {
            match self
                .retrieve(&account.provider_id, &account.account_id, &field.name)
                .await
            {
                Ok(value) => bundle.insert(field.name.clone(), value),
                Err(e) if e.is_miss() && !field.required => {}
                Err(e) => return Err(e),
            }
        }
        Ok(bundle)
    }

    /// Stores every field of a bundle, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`VaultError::Write`]. Fields written before the
    /// failure are left in place; callers roll back with
    /// [`CredentialVault::delete_all`].
    pub async fn store_all(
        &self,
        account: &AccountContext,
        secrets: &CredentialBundle,
    ) -> Result<(), VaultError> {
        for (field, value) in secrets.iter() {
            self.store(
                &account.provider_id,
                &account.account_id,
                field,
                value.expose(),
            )
            .await?;
        }
        Ok(())
    }

    /// Deletes the named fields, attempting all of them.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered after trying every field.
    pub async fn delete_all<'a>(
        &self,
        account: &AccountContext,
        fields: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), VaultError> {
        let mut first_err = None;
        for field in fields {
            if let Err(e) = self
                .delete(&account.provider_id, &account.account_id, field)
                .await
            {
                warn!(error = %e, "Failed to delete credential");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Stores every field of a bundle as a unit.
    ///
    /// Previous values are read first. If any write fails, every field is
    /// put back the way it was, deleting fields that had no value before.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Access`] if the previous values cannot be read,
    /// or the [`VaultError::Write`] that stopped the update.
    pub async fn store_all_or_restore(
        &self,
        account: &AccountContext,
        secrets: &CredentialBundle,
    ) -> Result<(), VaultError> {
        let (provider_id, account_id) = (&account.provider_id, account.account_id.as_str());

        let mut previous: Vec<(&str, Option<SecretValue>)> = Vec::with_capacity(secrets.len());
        for field in secrets.field_names() {
            match self.retrieve(provider_id, account_id, field).await {
                Ok(value) => previous.push((field, Some(value))),
                Err(VaultError::Miss { .. } | VaultError::Corrupt { .. }) => previous.push((field, None)),
                Err(e) => return Err(e),
            }
        }

        for (idx, (field, value)) in secrets.iter().enumerate() {
            let Err(e) = self.store(provider_id, account_id, field, value.expose()).await else {
                continue;
            };
            warn!(error = %e, "Failed to store credential, restoring");
            for (field, old) in &previous[..=idx] {
                let restored = match old {
                    Some(old) => self.store(provider_id, account_id, field, old.expose()).await,
                    None => self.delete(provider_id, account_id, field).await,
                };
                if let Err(restore) = restored {
                    warn!(error = %restore, "Failed to restore credential");
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Deletes the named fields as a unit.
    ///
    /// Current values are read first. If any delete fails, every field
    /// touched so far is written back and the store is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Access`] if the current values cannot be read,
    /// or the [`VaultError::Write`] that stopped the delete.
    pub async fn delete_all_or_restore<'a>(
        &self,
        account: &AccountContext,
        fields: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), VaultError> {
        let (provider_id, account_id) = (&account.provider_id, account.account_id.as_str());

        let mut saved: Vec<(&str, Option<SecretValue>)> = Vec::new();
        for field in fields {
            match self.retrieve(provider_id, account_id, field).await {
                Ok(value) => saved.push((field, Some(value))),
                Err(VaultError::Miss { .. } | VaultError::Corrupt { .. }) => saved.push((field, None)),
                Err(e) => return Err(e),
            }
        }

        for (idx, (field, _)) in saved.iter().enumerate() {
            let Err(e) = self.delete(provider_id, account_id, field).await else {
                continue;
            };
            warn!(error = %e, "Failed to delete credential, restoring");
            for (field, value) in &saved[..=idx] {
                let Some(value) = value else { continue };
                if let Err(restore) = self
                    .store(provider_id, account_id, field, value.expose())
                    .await
                {
                    warn!(error = %restore, "Failed to restore credential");
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

fn marker_key(key: &str) -> String {
    format!("{key}:chunks")
}

fn chunk_key(key: &str, idx: usize) -> String {
    format!("{key}:chunk:{idx}")
}

/// Splits text into pieces of at most `max` bytes on char boundaries.
fn split_chunks(value: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = value;
    while !rest.is_empty() {
        let mut end = rest.len().min(max);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

// ============================================================================
// Tests
// ============================================================================
