//! The plugin manager handle.
//!
//! [`PluginManager`] is cheap to clone; every clone shares one registration
//! table, account registry, cache, event bus, and scheduler.
//!
//! ## Account epochs
//!
//! Each registered account gets a fresh epoch number. Fetch cycles capture
//! the epoch when they start and commit only if the account is still
//! registered under the same epoch. The check and the commit happen under
//! the registry read lock, so a result can never be written or published
//! after `remove_account` has taken the account out.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use cloudmon_core::{
    AccountContext, AccountKey, CacheKey, CredentialBundle, ProviderDescriptor, ProviderError,
    ProviderId, ProviderPlugin,
};
use cloudmon_fetch::CredentialVault;
use cloudmon_store::{CacheManager, Event, EventBus, EventFilter, ManagerConfig, Subscription};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ManagerError;
use crate::scheduler::SchedulerState;
use crate::status::{AccountStatus, CacheView, StatusBoard};

/// Floor for any polling interval.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// A result stays fresh for this many tenths of the polling interval, so
/// the next scheduled tick finds it stale.
const TTL_TENTHS: u32 = 9;

// ============================================================================
// Registry Entries
// ============================================================================

/// A registered plugin with its descriptor captured at registration.
pub(crate) struct RegisteredPlugin {
    pub(crate) descriptor: ProviderDescriptor,
    pub(crate) plugin: Arc<dyn ProviderPlugin>,
}

#[derive(Debug, Clone)]
struct AccountEntry {
    context: AccountContext,
    epoch: u64,
}

pub(crate) struct ManagerInner {
    pub(crate) config: ManagerConfig,
    pub(crate) vault: CredentialVault,
    pub(crate) cache: CacheManager,
    pub(crate) bus: EventBus,
    pub(crate) status: StatusBoard,
    pub(crate) scheduler: Mutex<SchedulerState>,
    plugins: RwLock<HashMap<ProviderId, Arc<RegisteredPlugin>>>,
    accounts: RwLock<HashMap<AccountKey, AccountEntry>>,
    /// Serializes `add_account` and `remove_account`.
    lifecycle: tokio::sync::Mutex<()>,
    next_epoch: AtomicU64,
}

// ============================================================================
// Plugin Manager
// ============================================================================

/// Registry of provider plugins and configured accounts.
#[derive(Clone)]
pub struct PluginManager {
    pub(crate) inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("providers", &self.provider_ids())
            .field("accounts", &self.accounts().len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl PluginManager {
    /// Creates a manager with an empty registry.
    pub fn new(config: ManagerConfig, vault: CredentialVault) -> Self {
        let cache = CacheManager::with_default_ttl(config.default_ttl());
        let bus = EventBus::new(config.event_capacity);
        Self {
            inner: Arc::new(ManagerInner {
                config,
                vault,
                cache,
                bus,
                status: StatusBoard::default(),
                scheduler: Mutex::new(SchedulerState::default()),
                plugins: RwLock::new(HashMap::new()),
                accounts: RwLock::new(HashMap::new()),
                lifecycle: tokio::sync::Mutex::new(()),
                next_epoch: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the settings.
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Returns the result cache.
    pub fn cache(&self) -> &CacheManager {
        &self.inner.cache
    }

    /// Returns the event bus.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Subscribes to manager events.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.inner.bus.subscribe(filter)
    }

    // ========================================================================
    // Plugins
    // ========================================================================

    /// Adds a plugin to the registration table.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::DuplicateProvider`] if a plugin with the
    /// same id is already registered.
    pub fn register_plugin(&self, plugin: Arc<dyn ProviderPlugin>) -> Result<(), ManagerError> {
        let descriptor = plugin.identify();
        let mut plugins = self.inner.plugins.write().unwrap_or_else(PoisonError::into_inner);
        if plugins.contains_key(&descriptor.id) {
            return Err(ManagerError::DuplicateProvider(descriptor.id));
        }
        info!(
            provider = %descriptor.id,
            capabilities = descriptor.capabilities.len(),
            "Registered provider plugin"
        );
        plugins.insert(
            descriptor.id.clone(),
            Arc::new(RegisteredPlugin { descriptor, plugin }),
        );
        Ok(())
    }

    pub(crate) fn plugin(&self, id: &ProviderId) -> Option<Arc<RegisteredPlugin>> {
        self.inner
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn require_plugin(&self, id: &ProviderId) -> Result<Arc<RegisteredPlugin>, ManagerError> {
        self.plugin(id)
            .ok_or_else(|| ManagerError::UnknownProvider(id.clone()))
    }

    /// Returns the descriptor of a registered provider.
    pub fn descriptor(&self, id: &ProviderId) -> Option<ProviderDescriptor> {
        self.plugin(id).map(|r| r.descriptor.clone())
    }

    /// Returns every registered descriptor, ordered by id.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        let plugins = self.inner.plugins.read().unwrap_or_else(PoisonError::into_inner);
        let mut descriptors: Vec<_> = plugins.values().map(|r| r.descriptor.clone()).collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }

    /// Returns every registered provider id, ordered.
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.descriptors().into_iter().map(|d| d.id).collect()
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    fn accounts_read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<AccountKey, AccountEntry>> {
        self.inner.accounts.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the account's secrets, validates them, and registers the
    /// account.
    ///
    /// Only fields the provider declares are stored. If storing or
    /// validation fails, every stored field is deleted again and the
    /// registry is left untouched.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::InvalidAccount`] for unusable ids
    /// - [`ManagerError::UnknownProvider`] / [`ManagerError::DuplicateAccount`]
    /// - [`ManagerError::Vault`] if the secrets cannot be stored
    /// - [`ManagerError::CredentialValidation`] if the plugin rejects them
    #[instrument(skip(self, context, secrets), fields(provider = %context.provider_id, account = %context.account_id))]
    pub async fn add_account(
        &self,
        context: AccountContext,
        secrets: CredentialBundle,
    ) -> Result<(), ManagerError> {
        context.validate()?;
        let registered = self.require_plugin(&context.provider_id)?;
        let _lifecycle = self.inner.lifecycle.lock().await;

        let key = context.key();
        if self.account(&key).is_some() {
            return Err(ManagerError::DuplicateAccount(key));
        }

        let secrets = declared_fields(&registered.descriptor, secrets);
        if let Err(e) = self.inner.vault.store_all(&context, &secrets).await {
            warn!(error = %e, "Storing credentials failed, rolling back");
            self.rollback_secrets(&context, &secrets).await;
            return Err(e.into());
        }

        let deadline = self.inner.config.validation_timeout();
        let validation = timeout(
            deadline,
            registered.plugin.validate_credentials(&context, &secrets),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ProviderError::transient(format!(
                "Credential validation timed out after {deadline:?}"
            )))
        });
        drop(secrets);

        if let Err(source) = validation {
            warn!(error = %source, "Credential validation failed, rolling back");
            let fields = field_names(&registered.descriptor);
            if let Err(e) = self
                .inner
                .vault
                .delete_all(&context, fields.iter().map(String::as_str))
                .await
            {
                error!(error = %e, "Credential rollback incomplete");
            }
            return Err(ManagerError::CredentialValidation {
                account: key,
                source,
            });
        }

        self.commit_account(context)?;
        info!("Account added");
        Ok(())
    }

    async fn rollback_secrets(&self, context: &AccountContext, secrets: &CredentialBundle) {
        if let Err(e) = self
            .inner
            .vault
            .delete_all(context, secrets.field_names())
            .await
        {
            error!(error = %e, "Credential rollback incomplete");
        }
    }

    /// Registers an account whose secrets are already in the vault.
    ///
    /// Used when loading saved configuration; nothing is validated.
    ///
    /// # Errors
    ///
    /// Fails for unusable ids, unknown providers, and duplicates.
    pub fn register_account(&self, context: AccountContext) -> Result<(), ManagerError> {
        context.validate()?;
        self.require_plugin(&context.provider_id)?;
        debug!(provider = %context.provider_id, account = %context.account_id, "Registering saved account");
        self.commit_account(context)
    }

    fn commit_account(&self, context: AccountContext) -> Result<(), ManagerError> {
        let key = context.key();
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
        {
            let mut accounts = self.inner.accounts.write().unwrap_or_else(PoisonError::into_inner);
            if accounts.contains_key(&key) {
                return Err(ManagerError::DuplicateAccount(key));
            }
            accounts.insert(
                key.clone(),
                AccountEntry {
                    context: context.clone(),
                    epoch,
                },
            );
        }
        self.inner.status.insert(key);
        self.inner.bus.publish(&Event::AccountAdded(context.clone()));
        self.spawn_if_running(context, epoch);
        Ok(())
    }

    /// Changes an account's settings and, optionally, its secrets.
    ///
    /// `context` replaces the registered one and must name the same
    /// account. New secrets are merged over the stored ones and validated
    /// before anything is written; a rejected or unstorable bundle leaves
    /// the old secrets in place. On success the account's cache entries are
    /// dropped, its polling task restarts under a new epoch, and
    /// `AccountUpdated` is published.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::InvalidAccount`] / [`ManagerError::UnknownProvider`]
    /// - [`ManagerError::AccountNotFound`] if the account is not registered
    /// - [`ManagerError::CredentialValidation`] if the plugin rejects the
    ///   merged secrets
    /// - [`ManagerError::Vault`] if the secrets cannot be read or stored
    #[instrument(skip(self, context, secrets), fields(provider = %context.provider_id, account = %context.account_id))]
    pub async fn update_account(
        &self,
        context: AccountContext,
        secrets: Option<CredentialBundle>,
    ) -> Result<(), ManagerError> {
        context.validate()?;
        let registered = self.require_plugin(&context.provider_id)?;
        let _lifecycle = self.inner.lifecycle.lock().await;

        let key = context.key();
        if self.account(&key).is_none() {
            return Err(ManagerError::AccountNotFound(key));
        }

        if let Some(secrets) = secrets {
            let secrets = declared_fields(&registered.descriptor, secrets);
            let mut merged = CredentialBundle::new();
            for field in &registered.descriptor.credential_fields {
                match self
                    .inner
                    .vault
                    .retrieve(&context.provider_id, &context.account_id, &field.name)
                    .await
                {
                    Ok(value) => merged.insert(field.name.clone(), value),
                    Err(e) if e.is_miss() => {}
                    Err(e) => return Err(e.into()),
                }
            }
            for (field, value) in secrets.iter() {
                merged.insert(field, value.clone());
            }

            let deadline = self.inner.config.validation_timeout();
            let validation = timeout(
                deadline,
                registered.plugin.validate_credentials(&context, &merged),
            )
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::transient(format!(
                    "Credential validation timed out after {deadline:?}"
                )))
            });
            drop(merged);
            if let Err(source) = validation {
                warn!(error = %source, "New credentials rejected, keeping the old ones");
                return Err(ManagerError::CredentialValidation {
                    account: key,
                    source,
                });
            }

            self.inner.vault.store_all_or_restore(&context, &secrets).await?;
        }

        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
        self.inner
            .accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.clone(),
                AccountEntry {
                    context: context.clone(),
                    epoch,
                },
            );
        self.stop_account_task(&key);
        let invalidated = self
            .inner
            .cache
            .invalidate_account(&context.provider_id, &context.account_id);
        self.inner.status.remove(&key);
        self.inner.status.insert(key);
        self.inner.bus.publish(&Event::AccountUpdated(context.clone()));
        self.spawn_if_running(context, epoch);

        info!(invalidated, "Account updated");
        Ok(())
    }

    /// Deletes an account's secrets and removes it.
    ///
    /// The account leaves the registry before its secrets are touched, so
    /// no fetch can commit or publish while they are being deleted. Cache
    /// entries are invalidated, the polling task is stopped, and
    /// `AccountRemoved` is published. A fetch already in flight finishes
    /// but its result is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::AccountNotFound`], or [`ManagerError::Vault`]
    /// if the secrets cannot be deleted. The secrets are then restored and
    /// the account is registered again under a new epoch.
    #[instrument(skip(self))]
    pub async fn remove_account(
        &self,
        provider_id: &ProviderId,
        account_id: &str,
    ) -> Result<AccountContext, ManagerError> {
        let key = AccountKey::new(provider_id.clone(), account_id);
        let _lifecycle = self.inner.lifecycle.lock().await;

        let context = self
            .inner
            .accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
            .map(|e| e.context)
            .ok_or_else(|| ManagerError::AccountNotFound(key.clone()))?;
        self.stop_account_task(&key);

        let fields = self
            .plugin(provider_id)
            .map(|r| field_names(&r.descriptor))
            .unwrap_or_default();
        if let Err(e) = self
            .inner
            .vault
            .delete_all_or_restore(&context, fields.iter().map(String::as_str))
            .await
        {
            warn!(error = %e, "Deleting credentials failed, keeping the account");
            let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
            self.inner
                .accounts
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(
                    key,
                    AccountEntry {
                        context: context.clone(),
                        epoch,
                    },
                );
            self.spawn_if_running(context, epoch);
            return Err(e.into());
        }

        let invalidated = self.inner.cache.invalidate_account(provider_id, account_id);
        self.inner.status.remove(&key);
        self.inner.bus.publish(&Event::AccountRemoved(context.clone()));

        info!(invalidated, "Account removed");
        Ok(context)
    }

    /// Returns a registered account.
    pub fn account(&self, key: &AccountKey) -> Option<AccountContext> {
        self.accounts_read().get(key).map(|e| e.context.clone())
    }

    /// Returns every registered account, ordered by key.
    pub fn accounts(&self) -> Vec<AccountContext> {
        let mut accounts: Vec<_> = self
            .accounts_read()
            .values()
            .map(|e| e.context.clone())
            .collect();
        accounts.sort_by_key(AccountContext::key);
        accounts
    }

    pub(crate) fn account_entry(&self, key: &AccountKey) -> Option<(AccountContext, u64)> {
        self.accounts_read()
            .get(key)
            .map(|e| (e.context.clone(), e.epoch))
    }

    pub(crate) fn account_entries(&self) -> Vec<(AccountContext, u64)> {
        self.accounts_read()
            .values()
            .map(|e| (e.context.clone(), e.epoch))
            .collect()
    }

    /// Returns true if the account is registered under `epoch`.
    pub(crate) fn is_current(&self, key: &AccountKey, epoch: u64) -> bool {
        self.accounts_read().get(key).is_some_and(|e| e.epoch == epoch)
    }

    /// Runs `f` while holding the registry, if the account is current.
    pub(crate) fn if_current<R>(
        &self,
        key: &AccountKey,
        epoch: u64,
        f: impl FnOnce() -> R,
    ) -> Option<R> {
        let accounts = self.accounts_read();
        if accounts.get(key).is_some_and(|e| e.epoch == epoch) {
            Some(f())
        } else {
            None
        }
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Returns an account's health.
    pub fn status(&self, key: &AccountKey) -> Option<AccountStatus> {
        self.inner.status.get(key)
    }

    /// Returns the cached value for a key together with account health.
    pub fn view(&self, key: &CacheKey) -> CacheView {
        CacheView {
            lookup: self.inner.cache.get(key),
            status: self.inner.status.get(&key.account()),
        }
    }

    // ========================================================================
    // Intervals
    // ========================================================================

    /// The account's polling interval: override, else provider default,
    /// never below the configured minimum.
    pub fn poll_interval(&self, context: &AccountContext, descriptor: &ProviderDescriptor) -> Duration {
        context
            .poll_interval()
            .unwrap_or(descriptor.poll_interval)
            .max(self.inner.config.min_poll_interval())
            .max(MIN_INTERVAL)
    }

    /// TTL for a result polled every `interval`.
    pub(crate) fn ttl_for(&self, interval: Duration) -> Duration {
        self.inner
            .config
            .default_ttl()
            .min(interval.saturating_mul(TTL_TENTHS) / 10)
    }
}

fn field_names(descriptor: &ProviderDescriptor) -> Vec<String> {
    descriptor
        .credential_fields
        .iter()
        .map(|f| f.name.clone())
        .collect()
}

/// Keeps the fields the provider declares.
fn declared_fields(descriptor: &ProviderDescriptor, secrets: CredentialBundle) -> CredentialBundle {
    let declared: HashSet<&str> = descriptor
        .credential_fields
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    let ignored: Vec<&str> = secrets
        .field_names()
        .filter(|name| !declared.contains(name))
        .collect();
    if !ignored.is_empty() {
        warn!(?ignored, "Ignoring undeclared credential fields");
    }
    secrets
        .iter()
        .filter(|(name, _)| declared.contains(name))
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

pub(crate) fn lock_scheduler(inner: &ManagerInner) -> MutexGuard<'_, SchedulerState> {
    inner.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
}
