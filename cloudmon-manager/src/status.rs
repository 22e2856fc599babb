//! Per-account health tracking.
//!
//! The cache only ever holds successful results, so a failing account keeps
//! showing its last good value. [`AccountStatus`] carries the other half of
//! the picture: whether the latest cycles failed and whether the user has to
//! re-enter credentials. [`CacheView`] joins the two for display.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use cloudmon_core::{AccountKey, FetchFailure, FetchResult};
use cloudmon_store::{CacheLookup, Freshness};
use serde::Serialize;

// ============================================================================
// Health
// ============================================================================

/// Coarse account health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// No fetch has completed yet.
    #[default]
    Pending,
    /// The latest fetch succeeded.
    Healthy,
    /// The latest fetch failed with a recoverable error.
    Failing,
    /// Credentials were rejected or could not be read.
    NeedsReauth,
}

impl Health {
    /// Short label for tables.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Healthy => "ok",
            Self::Failing => "failing",
            Self::NeedsReauth => "re-auth",
        }
    }
}

/// Health bookkeeping for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountStatus {
    /// Current health.
    pub health: Health,
    /// Completion time of the latest successful fetch.
    pub last_success: Option<DateTime<Utc>>,
    /// Failure of the latest fetch, cleared on success.
    pub last_error: Option<FetchFailure>,
    /// Failed fetches since the last success, across query kinds.
    pub consecutive_failures: u32,
}

impl AccountStatus {
    fn record(&mut self, result: &FetchResult) {
        match &result.error {
            None => {
                self.health = Health::Healthy;
                self.last_success = Some(result.fetched_at);
                self.last_error = None;
                self.consecutive_failures = 0;
            }
            Some(failure) => {
                self.health = if failure.kind.needs_reauth() {
                    Health::NeedsReauth
                } else {
                    Health::Failing
                };
                self.last_error = Some(failure.clone());
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            }
        }
    }

    /// Returns true if the latest fetch failed.
    pub fn has_error(&self) -> bool {
        matches!(self.health, Health::Failing | Health::NeedsReauth)
    }
}

// ============================================================================
// Status Board
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct StatusBoard {
    accounts: Mutex<HashMap<AccountKey, AccountStatus>>,
}

impl StatusBoard {
    fn lock(&self) -> MutexGuard<'_, HashMap<AccountKey, AccountStatus>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, key: AccountKey) {
        self.lock().entry(key).or_default();
    }

    pub(crate) fn remove(&self, key: &AccountKey) {
        self.lock().remove(key);
    }

    pub(crate) fn record(&self, result: &FetchResult) {
        if let Some(status) = self.lock().get_mut(&result.key.account()) {
            status.record(result);
        }
    }

    pub(crate) fn get(&self, key: &AccountKey) -> Option<AccountStatus> {
        self.lock().get(key).cloned()
    }
}

// ============================================================================
// Cache View
// ============================================================================

/// What a dashboard shows for one cache key.
#[derive(Debug, Clone)]
pub struct CacheView {
    /// Cached result and its freshness.
    pub lookup: CacheLookup,
    /// Account health, `None` if the account is not registered.
    pub status: Option<AccountStatus>,
}

impl CacheView {
    /// Last known good result, fresh or stale.
    pub fn result(&self) -> Option<&FetchResult> {
        self.lookup.result.as_ref()
    }

    /// True when the shown value is past its TTL.
    pub fn is_stale(&self) -> bool {
        self.lookup.freshness == Freshness::Stale
    }

    /// True when the account's latest fetch failed.
    pub fn has_error(&self) -> bool {
        self.status.as_ref().is_some_and(AccountStatus::has_error)
    }

    /// The latest failure, if any.
    pub fn error(&self) -> Option<&FetchFailure> {
        self.status.as_ref()?.last_error.as_ref()
    }
}
