//! Publish/subscribe event bus.
//!
//! Every subscriber owns a bounded queue. [`EventBus::publish`] never waits:
//! when a queue is full the oldest event is dropped and a
//! [`SubscriberOverrunError`] is recorded. A slow subscriber therefore only
//! loses its own history and never delays the publisher or other
//! subscribers.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use cloudmon_core::{AccountContext, AccountKey, CacheKey, FetchFailure, FetchResult, ProviderId};
use futures::Stream;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Default per-subscriber queue capacity.
pub const DEFAULT_CAPACITY: usize = 256;

/// Number of overrun errors kept for inspection.
const MAX_RECENT_OVERRUNS: usize = 64;

// ============================================================================
// Events
// ============================================================================

/// A change published by the plugin manager.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A fetch succeeded (or a fresh cached result was re-published).
    FetchSucceeded(FetchResult),
    /// A fetch failed after retries.
    FetchFailed {
        /// Which query failed.
        key: CacheKey,
        /// Why.
        error: FetchFailure,
    },
    /// An account was added.
    AccountAdded(AccountContext),
    /// An account's settings or secrets changed.
    AccountUpdated(AccountContext),
    /// An account was removed.
    AccountRemoved(AccountContext),
}

impl Event {
    /// Returns the provider the event concerns.
    pub fn provider_id(&self) -> &ProviderId {
        match self {
            Self::FetchSucceeded(result) => &result.key.provider_id,
            Self::FetchFailed { key, .. } => &key.provider_id,
            Self::AccountAdded(ctx) | Self::AccountUpdated(ctx) | Self::AccountRemoved(ctx) => &ctx.provider_id,
        }
    }

    /// Returns the account the event concerns.
    pub fn account_id(&self) -> &str {
        match self {
            Self::FetchSucceeded(result) => &result.key.account_id,
            Self::FetchFailed { key, .. } => &key.account_id,
            Self::AccountAdded(ctx) | Self::AccountUpdated(ctx) | Self::AccountRemoved(ctx) => &ctx.account_id,
        }
    }

    /// Returns the cache key for fetch events.
    pub fn cache_key(&self) -> Option<&CacheKey> {
        match self {
            Self::FetchSucceeded(result) => Some(&result.key),
            Self::FetchFailed { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchSucceeded(_) => "fetch_succeeded",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::AccountAdded(_) => "account_added",
            Self::AccountUpdated(_) => "account_updated",
            Self::AccountRemoved(_) => "account_removed",
        }
    }
}

/// Caller-supplied event predicate.
pub type EventPredicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Selects which events a subscription receives.
#[derive(Clone)]
pub enum EventFilter {
    /// Every event.
    All,
    /// Events of one provider.
    Provider(ProviderId),
    /// Events of one account.
    Account(AccountKey),
    /// Events the predicate accepts.
    Predicate(EventPredicate),
}

impl EventFilter {
    /// Builds a filter from a closure.
    ///
    /// ```ignore
    /// let failures = bus.subscribe(EventFilter::predicate(|e| matches!(e, Event::FetchFailed { .. })));
    /// ```
    pub fn predicate(f: impl Fn(&Event) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    /// Returns true if the filter accepts the event.
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::All => true,
            Self::Provider(id) => event.provider_id() == id,
            Self::Account(key) => {
                event.provider_id() == &key.provider_id && event.account_id() == key.account_id
            }
            Self::Predicate(accept) => accept(event),
        }
    }
}

impl fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Provider(id) => f.debug_tuple("Provider").field(id).finish(),
            Self::Account(key) => f.debug_tuple("Account").field(key).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Identifies a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Recorded when a full queue forces the oldest event out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Subscriber {subscriber} overran its queue of {capacity}; dropped a {dropped} event")]
pub struct SubscriberOverrunError {
    /// Subscriber that lost the event.
    pub subscriber: SubscriberId,
    /// Queue capacity.
    pub capacity: usize,
    /// Name of the dropped event.
    pub dropped: &'static str,
    /// When it happened.
    pub at: DateTime<Utc>,
}

// ============================================================================
// Queues
// ============================================================================

#[derive(Debug)]
struct SubscriberQueue {
    filter: EventFilter,
    events: Mutex<VecDeque<Event>>,
    notify: Notify,
    closed: AtomicBool,
    overruns: AtomicU64,
}

impl SubscriberQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

#[derive(Debug)]
struct BusInner {
    subscribers: RwLock<HashMap<SubscriberId, Arc<SubscriberQueue>>>,
    next_id: AtomicU64,
    capacity: usize,
    overrun_total: AtomicU64,
    recent_overruns: Mutex<VecDeque<SubscriberOverrunError>>,
}

impl BusInner {
    fn remove(&self, id: SubscriberId) -> bool {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match removed {
            Some(queue) => {
                queue.close();
                debug!(subscriber = %id, "Unsubscribed");
                true
            }
            None => false,
        }
    }

    fn record_overrun(&self, error: SubscriberOverrunError) {
        warn!(
            subscriber = %error.subscriber,
            capacity = error.capacity,
            dropped = error.dropped,
            "Subscriber overrun, dropped oldest event"
        );
        self.overrun_total.fetch_add(1, Ordering::Relaxed);
        let mut recent = self
            .recent_overruns
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if recent.len() == MAX_RECENT_OVERRUNS {
            recent.pop_front();
        }
        recent.push_back(error);
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Cheaply clonable handle to a shared bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Creates a bus whose subscribers each buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
                overrun_total: AtomicU64::new(0),
                recent_overruns: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Returns the per-subscriber capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Registers a subscriber.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let queue = Arc::new(SubscriberQueue {
            filter,
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            overruns: AtomicU64::new(0),
        });
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&queue));
        debug!(subscriber = %id, filter = ?queue.filter, "Subscribed");

        Subscription {
            id,
            queue,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Removes a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.remove(id)
    }

    /// Delivers an event to every matching subscriber.
    ///
    /// Never waits. Returns the number of subscribers that received it.
    pub fn publish(&self, event: &Event) -> usize {
        let subscribers = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut delivered = 0;
        for (id, queue) in subscribers.iter() {
            if !queue.filter.matches(event) {
                continue;
            }
            let dropped = {
                let mut events = queue.lock();
                let dropped = if events.len() >= self.inner.capacity {
                    events.pop_front()
                } else {
                    None
                };
                events.push_back(event.clone());
                dropped
            };
            queue.notify.notify_one();
            delivered += 1;

            if let Some(dropped) = dropped {
                queue.overruns.fetch_add(1, Ordering::Relaxed);
                self.inner.record_overrun(SubscriberOverrunError {
                    subscriber: *id,
                    capacity: self.inner.capacity,
                    dropped: dropped.name(),
                    at: Utc::now(),
                });
            }
        }
        delivered
    }

    /// Returns the number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns the number of overruns across all subscribers.
    pub fn overrun_total(&self) -> u64 {
        self.inner.overrun_total.load(Ordering::Relaxed)
    }

    /// Returns the most recent overrun errors, oldest first.
    pub fn recent_overruns(&self) -> Vec<SubscriberOverrunError> {
        self.inner
            .recent_overruns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Receiving end of a subscription.
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    queue: Arc<SubscriberQueue>,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Returns the subscriber id.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            let next = self.queue.lock().pop_front();
            if let Some(event) = next {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.queue.lock().pop_front()
    }

    /// Returns the number of queued events.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns how many events this subscriber lost to overruns.
    pub fn overrun_count(&self) -> u64 {
        self.queue.overruns.load(Ordering::Relaxed)
    }

    /// Converts the subscription into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = Event> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}
