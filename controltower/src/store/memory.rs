//! In-memory evidence store with a scoped change feed.
//!
//! Used by tests and embedders that want the engine without a backend.
//! Every mutation notifies the feed subscribers of the affected table and
//! id. Fault injection hooks simulate an unreachable store, slow fetches
//! and dropped notification channels.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use super::ports::{ChangeFeed, ChangeNotice, ChangeStream, EvidenceStore, Table};
use crate::core::{ApprovalRequest, DeploymentRecord, EvidenceRecord, Execution, TelemetrySignal};
use crate::errors::StoreError;

#[derive(Debug, Default)]
struct Tables {
    executions: HashMap<String, Execution>,
    evidence: Vec<EvidenceRecord>,
    approvals: Vec<ApprovalRequest>,
    deployments: Vec<DeploymentRecord>,
    signals: Vec<TelemetrySignal>,
}

#[derive(Debug)]
struct FeedSubscriber {
    table: Table,
    scope_id: String,
    tx: mpsc::UnboundedSender<ChangeNotice>,
}

/// Thread-safe in-memory evidence store.
#[derive(Debug, Default)]
pub struct InMemoryEvidenceStore {
    tables: RwLock<Tables>,
    feeds: Mutex<Vec<FeedSubscriber>>,
    fetch_counts: Mutex<HashMap<Table, usize>>,
    next_ordering_key: AtomicI64,
    failing: AtomicBool,
    feed_unavailable: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
}

impl InMemoryEvidenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an execution row.
    pub fn put_execution(&self, execution: Execution) {
        let id = execution.id.clone();
        self.tables.write().executions.insert(id.clone(), execution);
        self.notify(Table::Executions, &id);
    }

    /// Appends an evidence record.
    ///
    /// A zero ordering key is replaced with the next store-assigned key.
    pub fn add_evidence(&self, mut record: EvidenceRecord) {
        if record.ordering_key == 0 {
            record.ordering_key = self.next_ordering_key.fetch_add(1, Ordering::SeqCst) + 1;
        }
        let id = record.execution_id.clone();
        self.tables.write().evidence.push(record);
        self.notify(Table::Evidence, &id);
    }

    /// Removes evidence records matching a predicate. Returns how many were removed.
    pub fn remove_evidence<F>(&self, predicate: F) -> usize
    where
        F: Fn(&EvidenceRecord) -> bool,
    {
        let removed: Vec<EvidenceRecord> = {
            let mut tables = self.tables.write();
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut tables.evidence)
                .into_iter()
                .partition(|record| predicate(record));
            tables.evidence = kept;
            removed
        };

        let mut ids: Vec<&str> = removed.iter().map(|r| r.execution_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        for id in ids {
            self.notify(Table::Evidence, id);
        }
        removed.len()
    }

    /// Appends an approval request.
    pub fn add_approval(&self, request: ApprovalRequest) {
        let id = request.execution_id.clone();
        self.tables.write().approvals.push(request);
        self.notify(Table::Approvals, &id);
    }

    /// Appends a deployment record.
    pub fn add_deployment(&self, record: DeploymentRecord) {
        let id = record.execution_id.clone();
        self.tables.write().deployments.push(record);
        self.notify(Table::Deployments, &id);
    }

    /// Appends a telemetry signal.
    pub fn add_signal(&self, signal: TelemetrySignal) {
        let id = signal.node_id.clone();
        self.tables.write().signals.push(signal);
        self.notify(Table::Signals, &id);
    }

    /// Makes every fetch fail with [`StoreError::Unavailable`] while set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delays every fetch by `delay`.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        *self.fetch_delay.lock() = delay;
    }

    /// Makes new feed subscriptions fail while set.
    pub fn set_feed_unavailable(&self, unavailable: bool) {
        self.feed_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drops every open feed stream, as a lost realtime connection would.
    pub fn disconnect_feeds(&self) {
        let dropped = std::mem::take(&mut *self.feeds.lock());
        debug!(count = dropped.len(), "Disconnected change feeds");
    }

    /// Number of feed streams whose receiver is still alive.
    #[must_use]
    pub fn active_feeds(&self) -> usize {
        self.feeds.lock().iter().filter(|f| !f.tx.is_closed()).count()
    }

    /// Number of fetches served for one table.
    #[must_use]
    pub fn fetch_count(&self, table: Table) -> usize {
        self.fetch_counts.lock().get(&table).copied().unwrap_or(0)
    }

    /// Number of fetches served across all tables.
    #[must_use]
    pub fn total_fetches(&self) -> usize {
        self.fetch_counts.lock().values().sum()
    }

    fn notify(&self, table: Table, scope_id: &str) {
        let notice = ChangeNotice::new(table, scope_id);
        self.feeds.lock().retain(|feed| {
            if feed.table != table || feed.scope_id != scope_id {
                return !feed.tx.is_closed();
            }
            feed.tx.send(notice.clone()).is_ok()
        });
    }

    async fn begin_fetch(&self, table: Table) -> Result<(), StoreError> {
        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(format!("{table} fetch refused")));
        }
        *self.fetch_counts.lock().entry(table).or_insert(0) += 1;
        Ok(())
    }
}

#[async_trait]
impl EvidenceStore for InMemoryEvidenceStore {
    async fn fetch_execution(&self, execution_id: &str) -> Result<Option<Execution>, StoreError> {
        self.begin_fetch(Table::Executions).await?;
        Ok(self.tables.read().executions.get(execution_id).cloned())
    }

    async fn fetch_evidence(&self, execution_id: &str) -> Result<Vec<EvidenceRecord>, StoreError> {
        self.begin_fetch(Table::Evidence).await?;
        Ok(self
            .tables
            .read()
            .evidence
            .iter()
            .filter(|r| r.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn fetch_approvals(
        &self,
        execution_id: &str,
    ) -> Result<Vec<ApprovalRequest>, StoreError> {
        self.begin_fetch(Table::Approvals).await?;
        Ok(self
            .tables
            .read()
            .approvals
            .iter()
            .filter(|a| a.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn fetch_deployments(
        &self,
        execution_id: &str,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        self.begin_fetch(Table::Deployments).await?;
        Ok(self
            .tables
            .read()
            .deployments
            .iter()
            .filter(|d| d.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn fetch_signals(&self, node_id: &str) -> Result<Vec<TelemetrySignal>, StoreError> {
        self.begin_fetch(Table::Signals).await?;
        Ok(self
            .tables
            .read()
            .signals
            .iter()
            .filter(|s| s.node_id == node_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ChangeFeed for InMemoryEvidenceStore {
    async fn subscribe(&self, table: Table, scope_id: &str) -> Result<ChangeStream, StoreError> {
        if self.feed_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Subscription(format!(
                "{table} feed unavailable for {scope_id}"
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().push(FeedSubscriber {
            table,
            scope_id: scope_id.to_string(),
            tx,
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|notice| (notice, rx))
        });
        Ok(stream.boxed())
    }
}
