//! Fetch cycles.
//!
//! One cycle resolves the account's secrets, calls the plugin until it
//! succeeds or the retry policy gives up, and commits the outcome:
//! successes go to the cache, every outcome updates account health and is
//! published on the bus.

use std::time::Duration;

use cloudmon_core::{
    AccountContext, AccountKey, CacheKey, FailureKind, FetchFailure, FetchResult, ProviderError,
    ProviderId, QueryKind,
};
use cloudmon_store::{Event, RefreshClaim, RefreshGuard};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::error::ManagerError;
use crate::manager::{PluginManager, RegisteredPlugin};

// ============================================================================
// Poll Outcome
// ============================================================================

/// What a poll produced.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// This call ran a fetch cycle. The result may be a failure.
    Fetched(FetchResult),
    /// The cached entry was fresh; no fetch ran.
    Cached(FetchResult),
    /// Another caller was already fetching; this is its result, or `None`
    /// if that result was discarded.
    Joined(Option<FetchResult>),
    /// Another caller was already fetching; this is the stale value shown
    /// in the meantime.
    InFlight(Option<FetchResult>),
    /// The account was removed while fetching; the result was dropped.
    Discarded,
}

impl PollOutcome {
    /// The result carried by this outcome.
    pub fn result(&self) -> Option<&FetchResult> {
        match self {
            Self::Fetched(r) | Self::Cached(r) => Some(r),
            Self::Joined(r) | Self::InFlight(r) => r.as_ref(),
            Self::Discarded => None,
        }
    }

    /// Consumes the outcome, returning its result.
    pub fn into_result(self) -> Option<FetchResult> {
        match self {
            Self::Fetched(r) | Self::Cached(r) => Some(r),
            Self::Joined(r) | Self::InFlight(r) => r,
            Self::Discarded => None,
        }
    }

    /// Returns true if this call invoked the plugin.
    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }
}

// ============================================================================
// Cycles
// ============================================================================

impl PluginManager {
    /// Fetches one query kind for one account now.
    ///
    /// Ignores freshness. If a fetch for the same key is already running,
    /// waits for it instead of starting another.
    ///
    /// # Errors
    ///
    /// Fails for unknown providers or accounts and unsupported query kinds.
    /// Fetch failures are reported inside the returned result.
    pub async fn poll_once(
        &self,
        provider_id: &ProviderId,
        account_id: &str,
        query: QueryKind,
    ) -> Result<PollOutcome, ManagerError> {
        let registered = self
            .plugin(provider_id)
            .ok_or_else(|| ManagerError::UnknownProvider(provider_id.clone()))?;
        let key = AccountKey::new(provider_id.clone(), account_id);
        let (context, epoch) = self
            .account_entry(&key)
            .ok_or(ManagerError::AccountNotFound(key))?;
        if !registered.descriptor.supports(query) {
            return Err(ManagerError::UnsupportedQuery {
                provider: provider_id.clone(),
                query,
            });
        }

        let cache_key = CacheKey::for_account(&context.key(), query);
        match self.inner.cache.begin_refresh(&cache_key) {
            RefreshClaim::Leader(guard) => {
                Ok(self.run_cycle(&registered, &context, epoch, guard).await)
            }
            RefreshClaim::Follower(flight) => {
                debug!(key = %cache_key, "Joining in-flight fetch");
                Ok(PollOutcome::Joined(flight.wait().await))
            }
        }
    }

    /// Polls every query kind the account's provider supports, concurrently.
    ///
    /// # Errors
    ///
    /// Fails for unknown providers or accounts.
    pub async fn poll_account(
        &self,
        provider_id: &ProviderId,
        account_id: &str,
    ) -> Result<Vec<PollOutcome>, ManagerError> {
        let registered = self
            .plugin(provider_id)
            .ok_or_else(|| ManagerError::UnknownProvider(provider_id.clone()))?;
        let queries: Vec<QueryKind> = registered.descriptor.capabilities.iter().copied().collect();
        let polls = queries
            .into_iter()
            .map(|query| self.poll_once(provider_id, account_id, query));
        futures::future::join_all(polls).await.into_iter().collect()
    }

    /// Scheduled refresh of one key.
    ///
    /// Serves fresh entries from the cache and never waits on another
    /// caller's fetch.
    pub(crate) async fn refresh_scheduled(
        &self,
        registered: &RegisteredPlugin,
        context: &AccountContext,
        epoch: u64,
        query: QueryKind,
    ) -> PollOutcome {
        let cache_key = CacheKey::for_account(&context.key(), query);
        if let Some(outcome) = self.cached_outcome(&cache_key, epoch) {
            return outcome;
        }

        match self.inner.cache.begin_refresh(&cache_key) {
            RefreshClaim::Leader(guard) => {
                // A leader may have finished between the read and the claim.
                let lookup = self.inner.cache.get(&cache_key);
                if lookup.is_fresh() {
                    guard.release(lookup.result.clone());
                    return lookup.result.map_or(PollOutcome::Discarded, PollOutcome::Cached);
                }
                self.run_cycle(registered, context, epoch, guard).await
            }
            RefreshClaim::Follower(flight) => {
                debug!(key = %cache_key, "Fetch already in flight, serving stale value");
                PollOutcome::InFlight(flight.into_stale())
            }
        }
    }

    fn cached_outcome(&self, key: &CacheKey, epoch: u64) -> Option<PollOutcome> {
        let lookup = self.inner.cache.get(key);
        if !lookup.is_fresh() {
            return None;
        }
        let result = lookup.result?;
        if self.inner.config.publish_on_cache_hit {
            self.if_current(&key.account(), epoch, || {
                self.inner.bus.publish(&Event::FetchSucceeded(result.clone()));
            });
        }
        Some(PollOutcome::Cached(result))
    }

    async fn run_cycle(
        &self,
        registered: &RegisteredPlugin,
        context: &AccountContext,
        epoch: u64,
        guard: RefreshGuard,
    ) -> PollOutcome {
        let query = guard.key().query_kind;
        let result = self.fetch_with_retry(registered, context, epoch, query).await;
        let ttl = self.ttl_for(self.poll_interval(context, &registered.descriptor));
        self.commit(epoch, guard, result, ttl)
    }

    /// Runs the plugin under the retry policy.
    ///
    /// Secrets live only for the duration of this call.
    #[instrument(skip_all, fields(provider = %context.provider_id, account = %context.account_id, query = %query))]
    async fn fetch_with_retry(
        &self,
        registered: &RegisteredPlugin,
        context: &AccountContext,
        epoch: u64,
        query: QueryKind,
    ) -> FetchResult {
        let account = context.key();
        let key = CacheKey::for_account(&account, query);

        let secrets = match self
            .inner
            .vault
            .resolve(context, &registered.descriptor.credential_fields)
            .await
        {
            Ok(secrets) => secrets,
            Err(e) => {
                warn!(error = %e, "Credentials unavailable");
                return FetchResult::failure(
                    key,
                    FetchFailure::new(FailureKind::CredentialsUnavailable, e.to_string()),
                );
            }
        };

        let policy = &self.inner.config.retry;
        let deadline = self.inner.config.fetch_timeout();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let started = Instant::now();
            let outcome = timeout(deadline, registered.plugin.fetch(context, query, &secrets))
                .await
                .unwrap_or_else(|_| {
                    Err(ProviderError::transient(format!(
                        "Fetch timed out after {deadline:?}"
                    )))
                });

            match outcome {
                Ok(payload) => {
                    info!(attempts, duration = ?started.elapsed(), "Fetch succeeded");
                    return FetchResult::success(key, payload).with_attempts(attempts);
                }
                Err(err) if policy.should_retry(&err, attempts) => {
                    if !self.is_current(&account, epoch) {
                        debug!("Account removed, abandoning retries");
                        return FetchResult::failure(key, FetchFailure::from(&err))
                            .with_attempts(attempts);
                    }
                    let delay = policy.delay_for(attempts, &err);
                    warn!(attempt = attempts, error = %err, ?delay, "Fetch failed, retrying");
                    sleep(delay).await;
                }
                Err(err) => {
                    warn!(attempts, error = %err, "Fetch failed");
                    return FetchResult::failure(key, FetchFailure::from(&err))
                        .with_attempts(attempts);
                }
            }
        }
    }

    /// Writes the outcome if the account is still registered under `epoch`.
    fn commit(
        &self,
        epoch: u64,
        guard: RefreshGuard,
        result: FetchResult,
        ttl: Duration,
    ) -> PollOutcome {
        let key = guard.key().clone();
        let committed = self
            .if_current(&key.account(), epoch, move || {
                if result.success {
                    if !guard.complete(result.clone(), ttl) {
                        return None;
                    }
                    self.inner.bus.publish(&Event::FetchSucceeded(result.clone()));
                } else {
                    guard.release(Some(result.clone()));
                    if let Some(error) = &result.error {
                        self.inner.bus.publish(&Event::FetchFailed {
                            key: result.key.clone(),
                            error: error.clone(),
                        });
                    }
                }
                self.inner.status.record(&result);
                Some(result)
            })
            .flatten();

        if let Some(result) = committed {
            PollOutcome::Fetched(result)
        } else {
            debug!(key = %key, "Account removed during fetch, discarding result");
            PollOutcome::Discarded
        }
    }
}
