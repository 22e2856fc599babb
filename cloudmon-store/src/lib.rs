// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # CloudMon Store
//!
//! Shared state for the CloudMon core.
//!
//! This crate provides:
//!
//! - **CacheManager**: TTL cache keyed by (provider, account, query kind)
//!   with single-flight refresh tracking
//! - **EventBus**: Publish/subscribe with bounded per-subscriber queues
//! - **Persistence**: JSON configuration files and the SQLite warm-start
//!   snapshot
//!
//! ## Usage
//!
//! ```ignore
//! use cloudmon_store::{CacheManager, EventBus, EventFilter, RefreshClaim};
//!
//! let cache = CacheManager::new();
//! let bus = EventBus::new(256);
//! let mut sub = bus.subscribe(EventFilter::All);
//!
//! match cache.begin_refresh(&key) {
//!     RefreshClaim::Leader(guard) => {
//!         let result = fetch().await;
//!         guard.complete(result, ttl);
//!     }
//!     RefreshClaim::Follower(flight) => {
//!         let shared = flight.wait().await;
//!     }
//! }
//!
//! while let Some(event) = sub.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod persistence;
pub mod snapshot;

pub use cache::{CacheLookup, CacheManager, Freshness, InFlight, RefreshClaim, RefreshGuard};
pub use config::{ConfigFile, ManagerConfig};
pub use error::StoreError;
pub use events::{Event, EventBus, EventFilter, EventPredicate, SubscriberId, SubscriberOverrunError, Subscription};
pub use persistence::{
    default_cache_dir, default_config_dir, default_config_path, default_snapshot_path, ensure_dir,
    load_json, load_json_or_default, save_json,
};
pub use snapshot::SnapshotStore;

#[cfg(test)]
mod persistence_tests;
