//! Snapshot cache: one entry per subscribed id, shared by its subscribers.
//!
//! The registry is a `DashMap` keyed by id. Subscribers are added and
//! removed while holding the registry shard for that id, so the last
//! unsubscribe and a concurrent subscribe can never both believe they own
//! the entry. Publishing happens under the entry's subscriber lock: once
//! an entry is closed, or a subscriber's channel has been removed, nothing
//! more reaches it.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use super::state::{ScopeKind, SubscriptionState};
use super::worker::FeedSlot;
use crate::cancellation::CancellationToken;
use crate::core::Tracked;
use crate::events::{EventSink, SyncEvent, SyncEventKind};

type Update<V> = Arc<Tracked<V>>;

#[derive(Debug)]
struct Subscribers<V> {
    senders: HashMap<Uuid, mpsc::UnboundedSender<Update<V>>>,
    closed: bool,
}

/// Cached value, subscribers and worker bookkeeping for one id.
pub(crate) struct CacheEntry<V> {
    id: String,
    latest: RwLock<Option<Update<V>>>,
    subscribers: Mutex<Subscribers<V>>,
    state: RwLock<SubscriptionState>,
    token: CancellationToken,
    feed: FeedSlot,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<V> CacheEntry<V> {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            latest: RwLock::new(None),
            subscribers: Mutex::new(Subscribers {
                senders: HashMap::new(),
                closed: false,
            }),
            state: RwLock::new(SubscriptionState::Initializing),
            token: CancellationToken::new(),
            feed: FeedSlot::default(),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn latest(&self) -> Option<Update<V>> {
        self.latest.read().clone()
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        *self.state.read()
    }

    /// Moves to a new state and returns the previous one if it changed.
    /// A closed entry stays closed.
    pub(crate) fn transition(&self, next: SubscriptionState) -> Option<SubscriptionState> {
        let mut state = self.state.write();
        if *state == next || *state == SubscriptionState::Closed {
            return None;
        }
        Some(std::mem::replace(&mut *state, next))
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the entry has been closed.
    pub(crate) async fn closed(&self) {
        self.token.cancelled().await;
    }

    pub(crate) fn feed(&self) -> &FeedSlot {
        &self.feed
    }

    pub(crate) fn set_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock() = Some(handle);
    }

    fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker.lock().take()
    }

    /// Returns the number of subscribers left.
    fn remove_subscriber(&self, subscriber_id: Uuid) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.senders.remove(&subscriber_id);
        subscribers.senders.len()
    }

    fn close(&self, reason: &str) {
        {
            let mut subscribers = self.subscribers.lock();
            subscribers.closed = true;
            subscribers.senders.clear();
        }
        *self.state.write() = SubscriptionState::Closed;
        self.latest.write().take();
        self.feed.release();
        self.token.cancel(reason);
    }
}

impl<V: Clone + PartialEq> CacheEntry<V> {
    fn add_subscriber(&self, subscriber_id: Uuid, tx: mpsc::UnboundedSender<Update<V>>) {
        let mut subscribers = self.subscribers.lock();
        // seed with the current value so a late joiner does not wait for a change
        if let Some(current) = self.latest.read().clone() {
            let _ = tx.send(current);
        }
        subscribers.senders.insert(subscriber_id, tx);
    }

    /// Stores and pushes a value unless it equals the cached one.
    ///
    /// Returns the new revision, or `None` when the value was suppressed or
    /// the entry is closed.
    pub(crate) fn publish(&self, data: V, stale: bool) -> Option<u64> {
        let mut subscribers = self.subscribers.lock();
        if subscribers.closed {
            return None;
        }

        let update = {
            let mut latest = self.latest.write();
            if latest.as_ref().is_some_and(|c| c.same_content(&data, stale)) {
                return None;
            }
            let revision = latest.as_ref().map_or(1, |c| c.revision + 1);
            let update = Arc::new(Tracked {
                data,
                stale,
                revision,
            });
            *latest = Some(update.clone());
            update
        };

        subscribers
            .senders
            .retain(|_, tx| tx.send(update.clone()).is_ok());
        Some(update.revision)
    }
}

impl<V> fmt::Debug for CacheEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("subscribers", &self.subscribers.lock().senders.len())
            .field("revision", &self.latest.read().as_ref().map(|c| c.revision))
            .finish()
    }
}

/// Registry of cache entries for one scope.
pub(crate) struct SnapshotCache<V> {
    scope: ScopeKind,
    entries: DashMap<String, Arc<CacheEntry<V>>>,
    events: Arc<dyn EventSink>,
}

impl<V: Clone + PartialEq + Send + Sync + 'static> SnapshotCache<V> {
    pub(crate) fn new(scope: ScopeKind, events: Arc<dyn EventSink>) -> Self {
        Self {
            scope,
            entries: DashMap::new(),
            events,
        }
    }

    /// Adds a subscriber for `id`, creating the entry if needed.
    ///
    /// `start` runs once per created entry, after the registry shard has
    /// been released.
    pub(crate) fn attach<F>(self: &Arc<Self>, id: &str, start: F) -> SubscriptionHandle<V>
    where
        F: FnOnce(Arc<CacheEntry<V>>),
    {
        let subscriber_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut created = None;
        let entry = {
            let slot = self.entries.entry(id.to_string()).or_insert_with(|| {
                let entry = Arc::new(CacheEntry::new(id));
                created = Some(entry.clone());
                entry
            });
            slot.add_subscriber(subscriber_id, tx);
            Arc::clone(slot.value())
        };

        if let Some(entry) = created {
            debug!(scope = %self.scope, id, "Starting subscription worker");
            start(entry);
        }

        SubscriptionHandle {
            subscriber_id,
            entry,
            cache: Arc::clone(self),
            updates: rx,
        }
    }

    /// Removes a subscriber; closes and drops the entry if it was the last.
    pub(crate) fn detach(&self, id: &str, subscriber_id: Uuid) {
        let removed = self
            .entries
            .remove_if(id, |_, entry| entry.remove_subscriber(subscriber_id) == 0);

        if let Some((_, entry)) = removed {
            self.close_entry(&entry, "last subscriber left");
        }
    }

    fn close_entry(&self, entry: &CacheEntry<V>, reason: &str) {
        entry.close(reason);
        debug!(scope = %self.scope, id = %entry.id, reason, "Subscription closed");
        self.events
            .emit(&SyncEvent::new(self.scope, entry.id.clone(), SyncEventKind::Closed));
    }

    pub(crate) fn latest(&self, id: &str) -> Option<Update<V>> {
        self.entries.get(id).and_then(|entry| entry.latest())
    }

    pub(crate) fn state(&self, id: &str) -> Option<SubscriptionState> {
        self.entries.get(id).map(|entry| entry.state())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Closes every entry and returns their worker handles.
    pub(crate) fn close_all(&self, reason: &str) -> Vec<JoinHandle<()>> {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut workers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, entry)) = self.entries.remove(&id) {
                self.close_entry(&entry, reason);
                workers.extend(entry.take_worker());
            }
        }
        workers
    }
}

/// One consumer's view of a subscription.
///
/// Pull the current value with [`latest`](Self::latest) or await pushes
/// with [`next`](Self::next). Dropping the handle unsubscribes.
pub struct SubscriptionHandle<V: Clone + PartialEq + Send + Sync + 'static> {
    subscriber_id: Uuid,
    entry: Arc<CacheEntry<V>>,
    cache: Arc<SnapshotCache<V>>,
    updates: mpsc::UnboundedReceiver<Update<V>>,
}

impl<V: Clone + PartialEq + Send + Sync + 'static> SubscriptionHandle<V> {
    /// Execution or node id of this subscription.
    #[must_use]
    pub fn id(&self) -> &str {
        self.entry.id()
    }

    /// Identifies this consumer among the subscribers of the same id.
    #[must_use]
    pub fn subscriber_id(&self) -> Uuid {
        self.subscriber_id
    }

    /// Whether this is an execution or node subscription.
    #[must_use]
    pub fn scope(&self) -> ScopeKind {
        self.cache.scope
    }

    /// Current cached value, if one has been published.
    #[must_use]
    pub fn latest(&self) -> Option<Update<V>> {
        self.entry.latest()
    }

    /// Lifecycle state of the underlying subscription.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.entry.state()
    }

    /// Waits for the next pushed value. Returns `None` once the
    /// subscription has been closed.
    pub async fn next(&mut self) -> Option<Update<V>> {
        self.updates.recv().await
    }

    /// Returns a pushed value if one is waiting.
    pub fn try_next(&mut self) -> Option<Update<V>> {
        self.updates.try_recv().ok()
    }

    /// Stops receiving updates.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<V: Clone + PartialEq + Send + Sync + 'static> Drop for SubscriptionHandle<V> {
    fn drop(&mut self) {
        self.cache.detach(self.entry.id(), self.subscriber_id);
    }
}

impl<V: Clone + PartialEq + Send + Sync + 'static> fmt::Debug for SubscriptionHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("scope", &self.cache.scope)
            .field("id", &self.entry.id())
            .field("subscriber_id", &self.subscriber_id)
            .finish()
    }
}
