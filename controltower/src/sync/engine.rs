//! The reconciliation engine: subscription entry point for consumers.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::cache::{SnapshotCache, SubscriptionHandle};
use super::config::SyncConfig;
use super::projection::{ExecutionProjection, Projection, TelemetryProjection};
use super::state::{ScopeKind, SubscriptionState};
use super::worker::{Worker, WorkerContext};
use crate::core::{ExecutionSnapshot, TelemetryBadge, Tracked};
use crate::errors::Result;
use crate::events::{EventSink, NoOpEventSink};
use crate::store::{ChangeFeed, EvidenceStore};

/// Keeps derived execution snapshots and node badges in sync with the
/// evidence store for as long as someone is subscribed.
///
/// Subscribing twice to the same id shares one worker and one cached
/// value. Must be used from within a tokio runtime.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use controltower::prelude::*;
///
/// # async fn example() -> controltower::errors::Result<()> {
/// let store = Arc::new(InMemoryEvidenceStore::new());
/// let engine = ReconciliationEngine::builder(store.clone(), store).build()?;
///
/// let mut handle = engine.subscribe_execution("exec-1");
/// if let Some(update) = handle.next().await {
///     println!("progress {}%", update.data.progress);
/// }
/// engine.unsubscribe(handle);
/// # Ok(())
/// # }
/// ```
pub struct ReconciliationEngine {
    ctx: WorkerContext,
    executions: Arc<SnapshotCache<ExecutionSnapshot>>,
    nodes: Arc<SnapshotCache<TelemetryBadge>>,
}

impl ReconciliationEngine {
    /// Creates an engine with the default configuration and no event sink.
    #[must_use]
    pub fn new(store: Arc<dyn EvidenceStore>, feed: Arc<dyn ChangeFeed>) -> Self {
        Self::from_context(WorkerContext {
            store,
            feed,
            config: SyncConfig::default(),
            events: Arc::new(NoOpEventSink),
        })
    }

    /// Starts building an engine.
    #[must_use]
    pub fn builder(store: Arc<dyn EvidenceStore>, feed: Arc<dyn ChangeFeed>) -> EngineBuilder {
        EngineBuilder {
            store,
            feed,
            config: SyncConfig::default(),
            events: Arc::new(NoOpEventSink),
        }
    }

    fn from_context(ctx: WorkerContext) -> Self {
        Self {
            executions: Arc::new(SnapshotCache::new(
                ScopeKind::Execution,
                ctx.events.clone(),
            )),
            nodes: Arc::new(SnapshotCache::new(ScopeKind::Node, ctx.events.clone())),
            ctx,
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.ctx.config
    }

    /// Subscribes to the snapshot of one execution.
    ///
    /// The first push arrives once the initial fetch completes; later
    /// subscribers to the same id receive the cached snapshot immediately.
    pub fn subscribe_execution(&self, execution_id: &str) -> SubscriptionHandle<ExecutionSnapshot> {
        self.attach(&self.executions, ExecutionProjection, execution_id)
    }

    /// Subscribes to the telemetry badge of one node.
    pub fn subscribe_node(&self, node_id: &str) -> SubscriptionHandle<TelemetryBadge> {
        self.attach(&self.nodes, TelemetryProjection, node_id)
    }

    fn attach<P: Projection>(
        &self,
        cache: &Arc<SnapshotCache<P::Output>>,
        projection: P,
        id: &str,
    ) -> SubscriptionHandle<P::Output> {
        let handle = cache.attach(id, |entry| {
            Worker::new(projection, self.ctx.clone(), entry).spawn();
        });
        debug!(scope = %handle.scope(), id, "Subscribed");
        handle
    }

    /// Releases a subscription. When it was the last one for its id the
    /// worker is cancelled and the cached value dropped; nothing is pushed
    /// to the handle after this returns.
    pub fn unsubscribe<V>(&self, handle: SubscriptionHandle<V>)
    where
        V: Clone + PartialEq + Send + Sync + 'static,
    {
        handle.unsubscribe();
    }

    /// Current snapshot of a subscribed execution.
    #[must_use]
    pub fn snapshot(&self, execution_id: &str) -> Option<Arc<Tracked<ExecutionSnapshot>>> {
        self.executions.latest(execution_id)
    }

    /// Current telemetry badge of a subscribed node.
    #[must_use]
    pub fn node_badge(&self, node_id: &str) -> Option<Arc<Tracked<TelemetryBadge>>> {
        self.nodes.latest(node_id)
    }

    /// Lifecycle state of an execution subscription.
    #[must_use]
    pub fn execution_state(&self, execution_id: &str) -> Option<SubscriptionState> {
        self.executions.state(execution_id)
    }

    /// Lifecycle state of a node subscription.
    #[must_use]
    pub fn node_state(&self, node_id: &str) -> Option<SubscriptionState> {
        self.nodes.state(node_id)
    }

    /// Number of executions with at least one subscriber.
    #[must_use]
    pub fn active_executions(&self) -> usize {
        self.executions.len()
    }

    /// Number of nodes with at least one subscriber.
    #[must_use]
    pub fn active_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Closes every subscription and waits for the workers to stop.
    pub async fn shutdown(&self) {
        let mut workers = self.executions.close_all("engine shutdown");
        workers.extend(self.nodes.close_all("engine shutdown"));
        info!(workers = workers.len(), "Shutting down reconciliation engine");

        for worker in workers {
            if let Err(err) = worker.await {
                debug!(error = %err, "Worker ended abnormally");
            }
        }
    }
}

impl fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("config", &self.ctx.config)
            .field("active_executions", &self.active_executions())
            .field("active_nodes", &self.active_nodes())
            .finish()
    }
}

/// Builder for [`ReconciliationEngine`].
pub struct EngineBuilder {
    store: Arc<dyn EvidenceStore>,
    feed: Arc<dyn ChangeFeed>,
    config: SyncConfig,
    events: Arc<dyn EventSink>,
}

impl EngineBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the sink receiving lifecycle events.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Validates the configuration and builds the engine.
    pub fn build(self) -> Result<ReconciliationEngine> {
        self.config.validate()?;
        Ok(ReconciliationEngine::from_context(WorkerContext {
            store: self.store,
            feed: self.feed,
            config: self.config,
            events: self.events,
        }))
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
