//! Shared startup: config, vault, plugin registration, saved accounts.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cloudmon_core::{AccountContext, CacheKey, ProviderDescriptor};
use cloudmon_fetch::{CredentialVault, SystemKeychain};
use cloudmon_manager::{CacheView, PluginManager};
use cloudmon_providers::ProviderRegistry;
use cloudmon_store::{ConfigFile, SnapshotStore, default_config_path, default_snapshot_path};
use tracing::{debug, warn};

use crate::Cli;

/// One dashboard line: an account's value for one query kind.
pub struct DashboardRow {
    /// Provider metadata.
    pub descriptor: ProviderDescriptor,
    /// Account.
    pub account: AccountContext,
    /// Cache key shown on this line.
    pub key: CacheKey,
    /// Cached value and account health.
    pub view: CacheView,
}

/// A manager wired up from the config file.
pub struct App {
    /// Manager with every built-in plugin and saved account registered.
    pub manager: PluginManager,
    /// Config as loaded; edits take effect on [`App::save_config`].
    pub config: ConfigFile,
    config_path: PathBuf,
    snapshot_path: PathBuf,
}

impl App {
    /// Loads the config, registers every built-in plugin and the saved
    /// accounts.
    pub async fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone().unwrap_or_else(default_config_path);
        let snapshot_path = cli.snapshot.clone().unwrap_or_else(default_snapshot_path);

        let config = ConfigFile::load(&config_path)
            .await
            .with_context(|| format!("Failed to load {}", config_path.display()))?;

        let vault = CredentialVault::new(Arc::new(SystemKeychain::new()));
        let manager = PluginManager::new(config.manager.clone(), vault);
        for plugin in ProviderRegistry::builtin() {
            manager.register_plugin(plugin)?;
        }
        for account in &config.accounts {
            if let Err(e) = manager.register_account(account.clone()) {
                warn!(account = %account.key(), error = %e, "Skipping saved account");
            }
        }
        debug!(
            accounts = manager.accounts().len(),
            path = %config_path.display(),
            "Loaded configuration"
        );

        Ok(Self {
            manager,
            config,
            config_path,
            snapshot_path,
        })
    }

    /// Writes the config file.
    pub async fn save_config(&self) -> Result<()> {
        self.config
            .save(&self.config_path)
            .await
            .with_context(|| format!("Failed to save {}", self.config_path.display()))
    }

    /// Opens the snapshot database.
    pub async fn open_snapshot(&self) -> Result<SnapshotStore> {
        SnapshotStore::open(&self.snapshot_path)
            .await
            .with_context(|| format!("Failed to open {}", self.snapshot_path.display()))
    }

    /// Seeds the cache with saved results of configured accounts.
    ///
    /// Seeded entries are stale, so the first scheduled tick refetches them.
    pub async fn warm_start(&self, snapshot: &SnapshotStore) -> Result<usize> {
        let results = snapshot.load_all().await?;
        let mut seeded = 0;
        for result in results {
            if self.manager.account(&result.key.account()).is_some()
                && self.manager.cache().seed(result)
            {
                seeded += 1;
            }
        }
        debug!(seeded, "Warm start complete");
        Ok(seeded)
    }

    /// Builds the dashboard rows for the given accounts.
    pub fn rows<'a>(&self, accounts: impl IntoIterator<Item = &'a AccountContext>) -> Vec<DashboardRow> {
        let mut rows = Vec::new();
        for account in accounts {
            let Some(descriptor) = self.manager.descriptor(&account.provider_id) else {
                continue;
            };
            for query in &descriptor.capabilities {
                let key = CacheKey::for_account(&account.key(), *query);
                rows.push(DashboardRow {
                    view: self.manager.view(&key),
                    descriptor: descriptor.clone(),
                    account: account.clone(),
                    key,
                });
            }
        }
        rows
    }
}
