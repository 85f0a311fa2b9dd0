//! Per-id synchronization task.
//!
//! One worker runs for every subscribed execution or node. It owns the raw
//! inputs it has fetched, is the only writer to its cache entry, and stops
//! as soon as the entry is closed.

use futures::future::poll_fn;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use super::backoff::Backoff;
use super::cache::CacheEntry;
use super::config::SyncConfig;
use super::projection::Projection;
use super::state::SubscriptionState;
use crate::errors::StoreError;
use crate::events::{EventSink, SyncEvent, SyncEventKind};
use crate::store::{ChangeFeed, EvidenceStore, Table};

/// Something observed on the merged change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeedEvent {
    Changed(Table),
    Disconnected(Table),
}

pub(crate) type MergedFeed = BoxStream<'static, FeedEvent>;

/// Holds the open change feed of one cache entry.
///
/// The streams live on the entry rather than in the worker task, so
/// closing the entry drops them on the spot even while the worker is
/// parked in a fetch.
#[derive(Default)]
pub(crate) struct FeedSlot {
    inner: Mutex<SlotInner>,
}

#[derive(Default)]
struct SlotInner {
    feed: Option<MergedFeed>,
    released: bool,
}

impl FeedSlot {
    /// Stores a freshly opened feed. Once released, the feed is dropped
    /// and `false` is returned.
    pub(crate) fn install(&self, feed: MergedFeed) -> bool {
        let mut inner = self.inner.lock();
        if inner.released {
            return false;
        }
        inner.feed = Some(feed);
        true
    }

    /// Drops the current feed. A later `install` may open a new one.
    pub(crate) fn clear(&self) {
        let feed = self.inner.lock().feed.take();
        drop(feed);
    }

    /// Drops the current feed and refuses any further ones.
    pub(crate) fn release(&self) {
        let feed = {
            let mut inner = self.inner.lock();
            inner.released = true;
            inner.feed.take()
        };
        drop(feed);
    }

    pub(crate) fn is_open(&self) -> bool {
        self.inner.lock().feed.is_some()
    }

    /// Next event of the installed feed; `None` when there is none.
    pub(crate) async fn next(&self) -> Option<FeedEvent> {
        poll_fn(|cx| match self.inner.lock().feed.as_mut() {
            Some(feed) => feed.poll_next_unpin(cx),
            None => Poll::Ready(None),
        })
        .await
    }
}

/// What the loop does after one step.
enum Step {
    Continue,
    Degrade,
    Stop,
}

/// Notices gathered over one debounce window.
#[derive(Debug, Default)]
struct Burst {
    tables: BTreeSet<Table>,
    disconnected: Option<Table>,
    cancelled: bool,
}

enum Tick {
    Cancelled,
    Elapsed,
    Event(Option<FeedEvent>),
}

/// Shared collaborators handed to every worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) store: Arc<dyn EvidenceStore>,
    pub(crate) feed: Arc<dyn ChangeFeed>,
    pub(crate) config: SyncConfig,
    pub(crate) events: Arc<dyn EventSink>,
}

pub(crate) struct Worker<P: Projection> {
    projection: P,
    ctx: WorkerContext,
    entry: Arc<CacheEntry<P::Output>>,
    inputs: P::Inputs,
    backoff: Backoff,
}

impl<P: Projection> Worker<P> {
    pub(crate) fn new(
        projection: P,
        ctx: WorkerContext,
        entry: Arc<CacheEntry<P::Output>>,
    ) -> Self {
        Self {
            projection,
            ctx,
            entry,
            inputs: P::Inputs::default(),
            backoff: Backoff::new(),
        }
    }

    /// Spawns the worker and records its handle on the entry.
    pub(crate) fn spawn(self) {
        let entry = self.entry.clone();
        let scope = P::SCOPE;
        let span = info_span!("sync_worker", %scope, id = %entry.id());
        let handle = tokio::spawn(self.run().instrument(span));
        entry.set_worker(handle);
    }

    async fn run(mut self) {
        if self.entry.is_closed() {
            return;
        }

        // the feed opens before the fetch so no change slips between them
        if let Step::Stop = self.open_and_install().await {
            return;
        }
        if !self.refresh(self.projection.tables()).await {
            self.entry.feed().clear();
        }

        loop {
            if self.entry.is_closed() {
                break;
            }
            let step = if self.entry.feed().is_open() {
                self.transition(SubscriptionState::Live);
                self.live_step().await
            } else {
                self.transition(SubscriptionState::Degraded);
                self.degraded_step().await
            };
            match step {
                Step::Continue => {}
                Step::Degrade => self.entry.feed().clear(),
                Step::Stop => break,
            }
        }

        debug!("Worker stopped");
    }

    /// Waits for a notice, debounces the burst, then refreshes the named tables.
    async fn live_step(&mut self) -> Step {
        let event = tokio::select! {
            () = self.entry.closed() => return Step::Stop,
            event = self.entry.feed().next() => event,
        };

        let first = match event {
            Some(FeedEvent::Changed(table)) => table,
            Some(FeedEvent::Disconnected(table)) => {
                warn!(%table, "Change feed disconnected, falling back to polling");
                return Step::Degrade;
            }
            None => return Step::Degrade,
        };

        let burst = self.collect_burst(first).await;
        if burst.cancelled {
            return Step::Stop;
        }

        let tables: Vec<Table> = burst.tables.into_iter().collect();
        debug!(tables = ?tables, "Recomputing after change notices");
        let refreshed = self.refresh(&tables).await;

        if let Some(table) = burst.disconnected {
            warn!(%table, "Change feed disconnected, falling back to polling");
            return Step::Degrade;
        }
        if refreshed {
            Step::Continue
        } else {
            Step::Degrade
        }
    }

    async fn collect_burst(&self, first: Table) -> Burst {
        let mut burst = Burst::default();
        burst.tables.insert(first);
        let deadline = Instant::now() + self.ctx.config.debounce();

        loop {
            let tick = tokio::select! {
                () = self.entry.closed() => Tick::Cancelled,
                () = sleep_until(deadline) => Tick::Elapsed,
                event = self.entry.feed().next() => Tick::Event(event),
            };
            match tick {
                Tick::Cancelled => {
                    burst.cancelled = true;
                    return burst;
                }
                Tick::Elapsed => return burst,
                Tick::Event(Some(FeedEvent::Changed(table))) => {
                    burst.tables.insert(table);
                }
                Tick::Event(Some(FeedEvent::Disconnected(table))) => {
                    burst.disconnected = Some(table);
                    return burst;
                }
                Tick::Event(None) => {
                    burst.disconnected = burst.tables.first().copied();
                    return burst;
                }
            }
        }
    }

    /// Sleeps one poll interval, tries to reopen the feed and refetches everything.
    async fn degraded_step(&mut self) -> Step {
        let delay = self.poll_delay();
        tokio::select! {
            () = self.entry.closed() => return Step::Stop,
            () = sleep(delay) => {}
        }

        if let Step::Stop = self.open_and_install().await {
            return Step::Stop;
        }
        if !self.refresh(self.projection.tables()).await {
            return Step::Degrade;
        }
        if self.entry.feed().is_open() {
            info!("Change feed reopened");
        }
        Step::Continue
    }

    /// Opens the feed and hands it to the entry. Stops if the entry closes
    /// first.
    async fn open_and_install(&self) -> Step {
        let feed = tokio::select! {
            () = self.entry.closed() => return Step::Stop,
            feed = self.open_feed() => feed,
        };
        let Some(feed) = feed else {
            return Step::Continue;
        };
        if self.entry.feed().install(feed) {
            Step::Continue
        } else {
            Step::Stop
        }
    }

    fn poll_delay(&mut self) -> Duration {
        let interval = self.ctx.config.poll_interval();
        if self.backoff.failures() == 0 {
            interval
        } else {
            interval.max(self.backoff.next_delay(&self.ctx.config.retry))
        }
    }

    /// Opens one stream per table and merges them. All or nothing.
    async fn open_feed(&self) -> Option<MergedFeed> {
        let id = self.entry.id();
        let mut streams = Vec::new();

        for &table in self.projection.tables() {
            match self.ctx.feed.subscribe(table, id).await {
                Ok(notices) => streams.push(
                    notices
                        .map(|notice| FeedEvent::Changed(notice.table))
                        .chain(stream::once(async move { FeedEvent::Disconnected(table) }))
                        .boxed(),
                ),
                Err(err) => {
                    warn!(%table, error = %err, "Could not open change feed");
                    return None;
                }
            }
        }

        Some(stream::select_all(streams).boxed())
    }

    /// Fetches the given tables, recomputes and publishes. Returns false if
    /// the fetch failed, timed out or was cut short by closing the entry.
    async fn refresh(&mut self, tables: &[Table]) -> bool {
        let fetch_timeout = self.ctx.config.fetch_timeout();
        let entry = Arc::clone(&self.entry);
        let fetched = tokio::select! {
            () = entry.closed() => return false,
            fetched = timeout(fetch_timeout, self.fetch_tables(tables)) => fetched,
        };
        let result = match fetched {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(fetch_timeout)),
        };

        match result {
            Ok(()) => {
                if self.backoff.failures() > 0 {
                    info!(
                        failures = self.backoff.failures(),
                        "Fetch recovered after failures"
                    );
                }
                self.backoff.reset();
                let output = self.projection.compute(self.entry.id(), &self.inputs);
                self.publish(output, false);
                true
            }
            Err(err) => {
                self.on_fetch_failed(&err);
                false
            }
        }
    }

    async fn fetch_tables(&mut self, tables: &[Table]) -> Result<(), StoreError> {
        for &table in tables {
            self.projection
                .fetch_table(
                    self.ctx.store.as_ref(),
                    self.entry.id(),
                    table,
                    &mut self.inputs,
                )
                .await?;
        }
        Ok(())
    }

    /// Only retryable failures extend the backoff streak and can mark the
    /// cached value stale.
    fn on_fetch_failed(&mut self, err: &StoreError) {
        let retryable = err.is_retryable();
        if retryable {
            self.backoff.record_failure();
        }
        let failures = self.backoff.failures();
        warn!(error = %err, failures, retryable, "Fetch failed");
        self.emit(SyncEventKind::FetchFailed {
            error: err.to_string(),
            consecutive_failures: failures,
        });

        if retryable && failures >= self.ctx.config.stale_after_failures {
            if let Some(current) = self.entry.latest() {
                self.publish(current.data.clone(), true);
            }
        }
    }

    fn publish(&self, output: P::Output, stale: bool) {
        if let Some(revision) = self.entry.publish(output, stale) {
            debug!(revision, stale, "Published new value");
            self.emit(SyncEventKind::SnapshotPublished { revision, stale });
        }
    }

    fn transition(&self, next: SubscriptionState) {
        if let Some(from) = self.entry.transition(next) {
            info!(%from, to = %next, "Subscription state changed");
            self.emit(SyncEventKind::StateChanged { from, to: next });
        }
    }

    fn emit(&self, kind: SyncEventKind) {
        self.ctx
            .events
            .emit(&SyncEvent::new(P::SCOPE, self.entry.id(), kind));
    }
}
