// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `CloudMon` Manager
//!
//! Owns the provider registration table and the configured accounts, and
//! drives every fetch.
//!
//! ## Responsibilities
//!
//! - **Registration**: [`PluginManager::register_plugin`] builds the table
//!   at startup; there is no discovery.
//! - **Accounts**: [`PluginManager::add_account`] stores secrets in the
//!   vault and validates them before anything is committed;
//!   [`PluginManager::update_account`] swaps settings or secrets in place.
//! - **Fetch cycles**: secrets are resolved from the vault per cycle, each
//!   plugin call runs under a deadline, transient failures are retried with
//!   backoff, and only successes reach the cache.
//! - **Scheduling**: [`PluginManager::start`] runs one task per account;
//!   [`PluginManager::shutdown`] stops them and waits for in-flight
//!   fetches to drain.
//!
//! ## Usage
//!
//! ```ignore
//! use cloudmon_manager::PluginManager;
//!
//! let manager = PluginManager::new(config, vault);
//! for plugin in ProviderRegistry::builtin() {
//!     manager.register_plugin(plugin)?;
//! }
//! manager.add_account(account, secrets).await?;
//! manager.start();
//!
//! let mut events = manager.subscribe(EventFilter::All);
//! while let Some(event) = events.recv().await {
//!     let view = manager.view(&key);
//! }
//!
//! manager.shutdown().await;
//! ```

pub mod error;
pub mod manager;
pub mod status;

mod cycle;
mod scheduler;

pub use cycle::PollOutcome;
pub use error::ManagerError;
pub use manager::PluginManager;
pub use status::{AccountStatus, CacheView, Health};

#[cfg(test)]
mod scenario_tests;
#[cfg(test)]
mod test_support;
