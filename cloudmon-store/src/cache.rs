//! TTL cache with single-flight refresh tracking.
//!
//! Each [`CacheKey`] owns one slot holding at most one entry. Entries past
//! their TTL stay readable as [`Freshness::Stale`]; they are only removed by
//! invalidation.
//!
//! ## Single-flight
//!
//! [`CacheManager::begin_refresh`] hands out one [`RefreshGuard`] per key at
//! a time. Concurrent callers get an [`InFlight`] handle instead, which can
//! serve the stale value immediately or wait for the leader's result.
//!
//! ## Generations
//!
//! Invalidation bumps the slot's generation. A leader that started before
//! the bump cannot write its result, so a removed account never reappears
//! in the cache.
//!
//! ## Locking
//!
//! The key map sits behind a read-mostly lock; each slot has its own mutex.
//! Locks are always taken map first, slot second, and never held across an
//! `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use cloudmon_core::{CacheKey, FetchResult, ProviderId};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default TTL when the caller does not supply one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

// ============================================================================
// Lookup Types
// ============================================================================

/// Freshness of a cache read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within TTL.
    Fresh,
    /// Past TTL but still present.
    Stale,
    /// Never populated, or invalidated.
    Absent,
}

/// Result of [`CacheManager::get`].
#[derive(Debug, Clone)]
pub struct CacheLookup {
    /// Cached result, if any.
    pub result: Option<FetchResult>,
    /// Freshness of `result`.
    pub freshness: Freshness,
    /// True while a refresh for the key is in flight.
    pub refreshing: bool,
}

impl CacheLookup {
    fn absent() -> Self {
        Self {
            result: None,
            freshness: Freshness::Absent,
            refreshing: false,
        }
    }

    /// Returns true if the entry is within TTL.
    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }
}

// ============================================================================
// Slots
// ============================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    result: FetchResult,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn freshness(&self, now: Instant) -> Freshness {
        if now.saturating_duration_since(self.inserted_at) < self.ttl {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }
}

/// Progress of a single-flight refresh as seen by followers.
#[derive(Debug, Clone)]
enum FlightStatus {
    Pending,
    Done(Option<FetchResult>),
}

#[derive(Debug)]
struct Flight {
    id: u64,
    rx: watch::Receiver<FlightStatus>,
}

#[derive(Debug, Default)]
struct SlotState {
    entry: Option<CacheEntry>,
    generation: u64,
    flight: Option<Flight>,
}

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<SlotState>,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Cache Manager
// ============================================================================

/// TTL store keyed by (provider, account, query kind).
#[derive(Debug)]
pub struct CacheManager {
    slots: RwLock<HashMap<CacheKey, Arc<Slot>>>,
    default_ttl: Duration,
    next_flight: AtomicU64,
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheManager {
    /// Creates an empty cache with [`DEFAULT_TTL`].
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    /// Creates an empty cache with a custom default TTL.
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            default_ttl,
            next_flight: AtomicU64::new(1),
        }
    }

    /// Returns the default TTL.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn slot(&self, key: &CacheKey) -> Option<Arc<Slot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn slot_or_insert(&self, key: &CacheKey) -> Arc<Slot> {
        if let Some(slot) = self.slot(key) {
            return slot;
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    // ========================================================================
    // Reads and writes
    // ========================================================================

    /// Reads a key.
    pub fn get(&self, key: &CacheKey) -> CacheLookup {
        let Some(slot) = self.slot(key) else {
            return CacheLookup::absent();
        };
        let state = slot.lock();
        let refreshing = state.flight.is_some();
        match &state.entry {
            Some(entry) => CacheLookup {
                result: Some(entry.result.clone()),
                freshness: entry.freshness(Instant::now()),
                refreshing,
            },
            None => CacheLookup {
                refreshing,
                ..CacheLookup::absent()
            },
        }
    }

    /// Replaces the entry for a key. Last writer wins.
    pub fn put(&self, key: &CacheKey, result: FetchResult, ttl: Duration) {
        let slot = self.slot_or_insert(key);
        slot.lock().entry = Some(CacheEntry {
            result,
            inserted_at: Instant::now(),
            ttl,
        });
        trace!(key = %key, ttl_secs = ttl.as_secs(), "Cache entry stored");
    }

    /// Inserts a restored result as already stale.
    ///
    /// Does nothing if the key already has an entry. Returns true if the
    /// result was inserted.
    pub fn seed(&self, result: FetchResult) -> bool {
        let key = result.key.clone();
        let slot = self.slot_or_insert(&key);
        let mut state = slot.lock();
        if state.entry.is_some() {
            return false;
        }
        state.entry = Some(CacheEntry {
            result,
            inserted_at: Instant::now(),
            ttl: Duration::ZERO,
        });
        trace!(key = %key, "Cache entry seeded");
        true
    }

    /// Returns every stored result, fresh or stale.
    pub fn entries(&self) -> Vec<FetchResult> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut results: Vec<FetchResult> = slots
            .values()
            .filter_map(|slot| slot.lock().entry.as_ref().map(|e| e.result.clone()))
            .collect();
        results.sort_by(|a, b| a.key.cmp(&b.key));
        results
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|s| s.lock().entry.is_some()).count()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Removes the entry for a key. Returns true if an entry existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.invalidate_where(|k| k == key) > 0
    }

    /// Removes every entry of a provider. Returns the number removed.
    pub fn invalidate_provider(&self, provider_id: &ProviderId) -> usize {
        self.invalidate_where(|k| &k.provider_id == provider_id)
    }

    /// Removes every entry of an account. Returns the number removed.
    pub fn invalidate_account(&self, provider_id: &ProviderId, account_id: &str) -> usize {
        self.invalidate_where(|k| k.belongs_to(provider_id, account_id))
    }

    /// Clears the cache.
    pub fn clear(&self) -> usize {
        self.invalidate_where(|_| true)
    }

    fn invalidate_where(&self, matches: impl Fn(&CacheKey) -> bool) -> usize {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        slots.retain(|key, slot| {
            if !matches(key) {
                return true;
            }
            let mut state = slot.lock();
            if state.entry.take().is_some() {
                removed += 1;
            }
            state.generation += 1;
            // Slots with a live flight stay so the leader sees the new generation.
            state.flight.is_some()
        });
        if removed > 0 {
            debug!(removed, "Cache entries invalidated");
        }
        removed
    }

    // ========================================================================
    // Single-flight
    // ========================================================================

    /// Claims the refresh for a key.
    ///
    /// Returns [`RefreshClaim::Leader`] if no refresh is in flight, else
    /// [`RefreshClaim::Follower`].
    pub fn begin_refresh(&self, key: &CacheKey) -> RefreshClaim {
        let slot = self.slot_or_insert(key);
        let mut state = slot.lock();

        if let Some(flight) = &state.flight {
            trace!(key = %key, "Joining in-flight refresh");
            return RefreshClaim::Follower(InFlight {
                rx: flight.rx.clone(),
                stale: state.entry.as_ref().map(|e| e.result.clone()),
            });
        }

        let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(FlightStatus::Pending);
        state.flight = Some(Flight { id, rx });
        let generation = state.generation;
        drop(state);

        trace!(key = %key, flight = id, "Refresh claimed");
        RefreshClaim::Leader(RefreshGuard {
            key: key.clone(),
            slot,
            flight_id: id,
            generation,
            tx,
            finished: false,
        })
    }
}

// ============================================================================
// Refresh Handles
// ============================================================================

/// Outcome of [`CacheManager::begin_refresh`].
#[derive(Debug)]
pub enum RefreshClaim {
    /// The caller performs the fetch.
    Leader(RefreshGuard),
    /// Another caller is already fetching.
    Follower(InFlight),
}

/// Exclusive right to refresh one key.
///
/// Dropping the guard without finishing releases the flight and wakes
/// followers with no result.
#[derive(Debug)]
pub struct RefreshGuard {
    key: CacheKey,
    slot: Arc<Slot>,
    flight_id: u64,
    generation: u64,
    tx: watch::Sender<FlightStatus>,
    finished: bool,
}

impl RefreshGuard {
    /// Returns the key being refreshed.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Returns false once the key has been invalidated since the claim.
    pub fn is_current(&self) -> bool {
        self.slot.lock().generation == self.generation
    }

    /// Writes the result to the cache and wakes followers.
    ///
    /// Returns false, writing nothing, if the key was invalidated while the
    /// refresh was in flight. Followers then receive no result.
    pub fn complete(mut self, result: FetchResult, ttl: Duration) -> bool {
        let written = {
            let mut state = self.slot.lock();
            self.clear_flight(&mut state);
            if state.generation == self.generation {
                state.entry = Some(CacheEntry {
                    result: result.clone(),
                    inserted_at: Instant::now(),
                    ttl,
                });
                true
            } else {
                false
            }
        };

        if written {
            trace!(key = %self.key, "Refresh completed");
            self.finish(Some(result));
        } else {
            debug!(key = %self.key, "Discarding refresh result for invalidated key");
            self.finish(None);
        }
        written
    }

    /// Ends the flight without writing the cache.
    ///
    /// Followers receive `result`.
    pub fn release(mut self, result: Option<FetchResult>) {
        {
            let mut state = self.slot.lock();
            self.clear_flight(&mut state);
        }
        self.finish(result);
    }

    fn clear_flight(&self, state: &mut SlotState) {
        if state.flight.as_ref().is_some_and(|f| f.id == self.flight_id) {
            state.flight = None;
        }
    }

    fn finish(&mut self, result: Option<FetchResult>) {
        self.finished = true;
        self.tx.send_replace(FlightStatus::Done(result));
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        {
            let mut state = self.slot.lock();
            self.clear_flight(&mut state);
        }
        self.finish(None);
    }
}

/// Handle on a refresh someone else is performing.
#[derive(Debug)]
pub struct InFlight {
    rx: watch::Receiver<FlightStatus>,
    stale: Option<FetchResult>,
}

impl InFlight {
    /// The value cached when the handle was taken, if any.
    pub fn stale(&self) -> Option<&FetchResult> {
        self.stale.as_ref()
    }

    /// Consumes the handle, returning the cached value.
    pub fn into_stale(self) -> Option<FetchResult> {
        self.stale
    }

    /// Waits for the leader to finish and returns its result.
    ///
    /// Returns `None` if the leader released without a result or its
    /// result was discarded.
    pub async fn wait(mut self) -> Option<FetchResult> {
        let status = self
            .rx
            .wait_for(|s| matches!(s, FlightStatus::Done(_)))
            .await
            .ok()?;
        match &*status {
            FlightStatus::Done(result) => result.clone(),
            FlightStatus::Pending => None,
        }
    }
}
