//! Tests for live synchronization against the in-memory store.

use super::*;
use crate::core::{
    ApprovalStatus, DeploymentStatus, EvidenceStatus, SignalKind, StageId, StageStatus,
    StatusCode, StepCategory, Tracked,
};
use crate::errors::StoreError;
use crate::events::CollectingEventSink;
use crate::store::{InMemoryEvidenceStore, MockEvidenceStore, Table};
use crate::testing::{
    approval, deployment, evidence, signal, ExecutionBuilder, TEST_EXECUTION_ID, TEST_NODE_ID,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(3);

fn fast_config() -> SyncConfig {
    SyncConfig::new()
        .with_debounce_ms(20)
        .with_poll_interval_ms(30)
        .with_fetch_timeout_ms(200)
        .with_stale_after_failures(2)
        .with_retry(
            RetryConfig::new()
                .with_base_delay_ms(5)
                .with_max_delay_ms(40)
                .with_jitter(JitterStrategy::None),
        )
}

fn engine(store: &Arc<InMemoryEvidenceStore>) -> (ReconciliationEngine, Arc<CollectingEventSink>) {
    let sink = Arc::new(CollectingEventSink::new());
    let engine = ReconciliationEngine::builder(store.clone(), store.clone())
        .config(fast_config())
        .event_sink(sink.clone())
        .build()
        .unwrap();
    (engine, sink)
}

async fn next_update<V>(handle: &mut SubscriptionHandle<V>) -> Arc<Tracked<V>>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    timeout(WAIT, handle.next())
        .await
        .expect("no update within the wait window")
        .expect("subscription closed")
}

async fn assert_quiet<V>(handle: &mut SubscriptionHandle<V>, window: Duration)
where
    V: Clone + PartialEq + Send + Sync + 'static + std::fmt::Debug,
{
    if let Ok(update) = timeout(window, handle.next()).await {
        panic!("unexpected update: {update:?}");
    }
}

async fn wait_for(condition: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within the wait window");
}

#[tokio::test]
async fn test_initial_push_reflects_store() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    store.put_execution(ExecutionBuilder::default().commit("abc123", "main").build());
    store.add_evidence(evidence(StepCategory::Test, EvidenceStatus::Passed));
    let (engine, _) = engine(&store);

    let mut handle = engine.subscribe_execution(TEST_EXECUTION_ID);
    let update = next_update(&mut handle).await;

    assert_eq!(update.revision, 1);
    assert!(!update.stale);
    assert_eq!(update.data.status_of(StageId::Commit), StageStatus::Passed);
    assert_eq!(update.data.status_of(StageId::Ci), StageStatus::Passed);
    assert_eq!(update.data.progress, 25);
    assert_eq!(handle.latest(), Some(update));

    wait_for(|| engine.execution_state(TEST_EXECUTION_ID) == Some(SubscriptionState::Live)).await;
}

#[tokio::test]
async fn test_deployment_success_pushed_once_per_distinct_snapshot() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    store.put_execution(ExecutionBuilder::default().build());
    store.add_deployment(deployment(DeploymentStatus::Running));
    let (engine, sink) = engine(&store);

    let mut handle = engine.subscribe_execution(TEST_EXECUTION_ID);
    let first = next_update(&mut handle).await;
    assert_eq!(first.data.status_of(StageId::Cd), StageStatus::Running);

    store.add_deployment(deployment(DeploymentStatus::Success));
    let second = next_update(&mut handle).await;
    assert_eq!(second.data.status_of(StageId::Cd), StageStatus::Passed);
    assert_eq!(second.revision, 2);

    // rewriting an identical row recomputes but changes nothing
    store.put_execution(ExecutionBuilder::default().build());
    assert_quiet(&mut handle, Duration::from_millis(200)).await;

    assert_eq!(sink.events_of_type("sync.snapshot_published").len(), 2);
    assert_eq!(engine.snapshot(TEST_EXECUTION_ID).unwrap().revision, 2);
}

#[tokio::test]
async fn test_unsubscribe_discards_inflight_recompute() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    let (engine, sink) = engine(&store);

    let mut handle = engine.subscribe_execution(TEST_EXECUTION_ID);
    next_update(&mut handle).await;
    wait_for(|| engine.execution_state(TEST_EXECUTION_ID) == Some(SubscriptionState::Live)).await;

    store.set_fetch_delay(Some(Duration::from_millis(100)));
    store.add_evidence(evidence(StepCategory::Test, EvidenceStatus::Passed));
    sleep(Duration::from_millis(40)).await;

    let published = sink.events_of_type("sync.snapshot_published").len();
    engine.unsubscribe(handle);
    sleep(Duration::from_millis(250)).await;

    assert_eq!(sink.events_of_type("sync.snapshot_published").len(), published);
    assert_eq!(sink.events_of_type("sync.closed").len(), 1);
    assert!(engine.snapshot(TEST_EXECUTION_ID).is_none());
    assert_eq!(engine.execution_state(TEST_EXECUTION_ID), None);
    assert_eq!(engine.active_executions(), 0);
}

#[tokio::test]
async fn test_unsubscribe_releases_feed_immediately() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    let (engine, _) = engine(&store);

    let mut idle = engine.subscribe_execution(TEST_EXECUTION_ID);
    next_update(&mut idle).await;
    wait_for(|| store.active_feeds() == 4).await;
    engine.unsubscribe(idle);
    assert_eq!(store.active_feeds(), 0);

    let mut busy = engine.subscribe_execution(TEST_EXECUTION_ID);
    next_update(&mut busy).await;
    wait_for(|| engine.execution_state(TEST_EXECUTION_ID) == Some(SubscriptionState::Live)).await;
    assert_eq!(store.active_feeds(), 4);

    // worker is parked in a slow fetch when the last subscriber leaves
    store.set_fetch_delay(Some(Duration::from_millis(150)));
    store.add_evidence(evidence(StepCategory::Test, EvidenceStatus::Passed));
    sleep(Duration::from_millis(60)).await;
    engine.unsubscribe(busy);
    assert_eq!(store.active_feeds(), 0);
}

#[tokio::test]
async fn test_shutdown_interrupts_slow_fetch() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    store.set_fetch_delay(Some(Duration::from_secs(2)));
    let sink = Arc::new(CollectingEventSink::new());
    let engine = ReconciliationEngine::builder(store.clone(), store.clone())
        .config(fast_config().with_fetch_timeout_ms(5_000))
        .event_sink(sink.clone())
        .build()
        .unwrap();

    let _handle = engine.subscribe_execution(TEST_EXECUTION_ID);
    wait_for(|| store.active_feeds() == 4).await;

    timeout(Duration::from_millis(500), engine.shutdown())
        .await
        .expect("shutdown waited for the fetch");
    assert_eq!(store.active_feeds(), 0);
    assert!(sink.events_of_type("sync.fetch_failed").is_empty());
}

#[tokio::test]
async fn test_subscribers_share_one_fetch_cycle() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    store.put_execution(ExecutionBuilder::default().build());
    let (engine, _) = engine(&store);

    let mut a = engine.subscribe_execution(TEST_EXECUTION_ID);
    let mut b = engine.subscribe_execution(TEST_EXECUTION_ID);
    assert_eq!(engine.active_executions(), 1);

    let first_a = next_update(&mut a).await;
    let first_b = next_update(&mut b).await;
    assert_eq!(first_a, first_b);
    assert_eq!(store.fetch_count(Table::Executions), 1);
    assert_eq!(store.fetch_count(Table::Evidence), 1);

    wait_for(|| engine.execution_state(TEST_EXECUTION_ID) == Some(SubscriptionState::Live)).await;
    store.add_approval(approval(ApprovalStatus::Pending));
    let update_a = next_update(&mut a).await;
    let update_b = next_update(&mut b).await;
    assert_eq!(update_a.data.status_of(StageId::Approval), StageStatus::Running);
    assert_eq!(update_a, update_b);

    // only the table named by the notice is fetched again
    assert_eq!(store.fetch_count(Table::Approvals), 2);
    assert_eq!(store.fetch_count(Table::Executions), 1);

    engine.unsubscribe(a);
    store.add_approval(approval(ApprovalStatus::Approved));
    let update_b = next_update(&mut b).await;
    assert_eq!(update_b.data.status_of(StageId::Approval), StageStatus::Passed);
    assert_eq!(engine.active_executions(), 1);
}

#[tokio::test]
async fn test_late_subscriber_receives_cached_snapshot() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    store.add_evidence(evidence(StepCategory::Build, EvidenceStatus::Passed));
    let (engine, _) = engine(&store);

    let mut first = engine.subscribe_execution(TEST_EXECUTION_ID);
    let initial = next_update(&mut first).await;

    let mut late = engine.subscribe_execution(TEST_EXECUTION_ID);
    let seeded = late.try_next().expect("late subscriber is seeded");
    assert_eq!(seeded, initial);
    assert_eq!(store.fetch_count(Table::Evidence), 1);
}

#[tokio::test]
async fn test_burst_collapses_into_one_recompute() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    let (engine, _) = engine(&store);

    let mut handle = engine.subscribe_execution(TEST_EXECUTION_ID);
    next_update(&mut handle).await;
    wait_for(|| engine.execution_state(TEST_EXECUTION_ID) == Some(SubscriptionState::Live)).await;

    for _ in 0..5 {
        store.add_evidence(evidence(StepCategory::Test, EvidenceStatus::Passed));
    }

    let update = next_update(&mut handle).await;
    let ci = update.data.stage(StageId::Ci).unwrap();
    assert_eq!(ci.status, StageStatus::Passed);
    assert_eq!(store.fetch_count(Table::Evidence), 2);
    assert_quiet(&mut handle, Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_feed_disconnect_falls_back_to_polling() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    let (engine, sink) = engine(&store);

    let mut handle = engine.subscribe_execution(TEST_EXECUTION_ID);
    next_update(&mut handle).await;
    wait_for(|| store.active_feeds() == 4).await;

    store.disconnect_feeds();
    store.add_evidence(evidence(StepCategory::Sast, EvidenceStatus::Failed));

    let update = next_update(&mut handle).await;
    assert_eq!(update.data.status_of(StageId::Security), StageStatus::Failed);
    assert!(!update.stale);

    wait_for(|| {
        engine.execution_state(TEST_EXECUTION_ID) == Some(SubscriptionState::Live)
            && store.active_feeds() == 4
    })
    .await;

    let degraded = sink
        .events_of_type("sync.state_changed")
        .iter()
        .filter(|e| e.payload()["to"] == "degraded")
        .count();
    assert!(degraded >= 1);
}

#[tokio::test]
async fn test_feed_unavailable_still_serves_snapshots() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    store.set_feed_unavailable(true);
    let (engine, _) = engine(&store);

    let mut handle = engine.subscribe_execution(TEST_EXECUTION_ID);
    let first = next_update(&mut handle).await;
    assert_eq!(first.data.progress, 0);
    wait_for(|| engine.execution_state(TEST_EXECUTION_ID) == Some(SubscriptionState::Degraded))
        .await;

    store.add_evidence(evidence(StepCategory::Test, EvidenceStatus::Running));
    let update = next_update(&mut handle).await;
    assert_eq!(update.data.active_stage, Some(StageId::Ci));

    store.set_feed_unavailable(false);
    wait_for(|| engine.execution_state(TEST_EXECUTION_ID) == Some(SubscriptionState::Live)).await;
}

#[tokio::test]
async fn test_repeated_failures_mark_snapshot_stale() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    store.put_execution(ExecutionBuilder::default().commit("abc123", "main").build());
    let (engine, sink) = engine(&store);

    let mut handle = engine.subscribe_execution(TEST_EXECUTION_ID);
    let fresh = next_update(&mut handle).await;
    wait_for(|| store.active_feeds() == 4).await;

    store.set_failing(true);
    store.disconnect_feeds();

    let stale = next_update(&mut handle).await;
    assert!(stale.stale);
    assert_eq!(stale.data, fresh.data);
    assert_eq!(stale.revision, 2);
    assert!(sink.events_of_type("sync.fetch_failed").len() >= 2);
    assert!(engine.snapshot(TEST_EXECUTION_ID).unwrap().stale);

    store.set_failing(false);
    let recovered = next_update(&mut handle).await;
    assert!(!recovered.stale);
    assert_eq!(recovered.data, fresh.data);
    assert_eq!(recovered.revision, 3);
}

#[tokio::test]
async fn test_fetch_timeout_degrades_until_store_responds() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    store.set_fetch_delay(Some(Duration::from_millis(300)));
    let (engine, sink) = engine(&store);

    let mut handle = engine.subscribe_execution(TEST_EXECUTION_ID);
    wait_for(|| engine.execution_state(TEST_EXECUTION_ID) == Some(SubscriptionState::Degraded))
        .await;
    assert!(handle.latest().is_none());

    let failures = sink.events_of_type("sync.fetch_failed");
    assert!(failures[0].payload()["error"]
        .as_str()
        .unwrap()
        .contains("timed out"));

    store.set_fetch_delay(None);
    let update = next_update(&mut handle).await;
    assert_eq!(update.revision, 1);
    assert!(!update.stale);
    wait_for(|| engine.execution_state(TEST_EXECUTION_ID) == Some(SubscriptionState::Live)).await;
}

#[tokio::test]
async fn test_node_badge_updates_live() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    store.add_signal(signal(SignalKind::Trace));
    store.add_signal(signal(SignalKind::Metric));
    let (engine, _) = engine(&store);

    let mut handle = engine.subscribe_node(TEST_NODE_ID);
    assert_eq!(handle.scope(), ScopeKind::Node);
    let first = next_update(&mut handle).await;
    assert_eq!(first.data.trace_count, 1);
    assert_eq!(first.data.metric_count, 1);
    assert!(!first.data.has_errors);
    wait_for(|| engine.node_state(TEST_NODE_ID) == Some(SubscriptionState::Live)).await;

    store.add_signal(signal(SignalKind::Log).with_status(StatusCode::Error));
    let update = next_update(&mut handle).await;
    assert_eq!(update.data.log_count, 1);
    assert!(update.data.has_errors);
    assert_eq!(engine.node_badge(TEST_NODE_ID), Some(update));
    assert_eq!(engine.active_nodes(), 1);
    assert_eq!(engine.active_executions(), 0);
}

#[tokio::test]
async fn test_changes_for_other_ids_are_ignored() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    let (engine, _) = engine(&store);

    let mut handle = engine.subscribe_execution(TEST_EXECUTION_ID);
    next_update(&mut handle).await;
    wait_for(|| engine.execution_state(TEST_EXECUTION_ID) == Some(SubscriptionState::Live)).await;

    store.add_evidence(crate::testing::evidence_for(
        "exec-2",
        StepCategory::Test,
        EvidenceStatus::Failed,
    ));
    assert_quiet(&mut handle, Duration::from_millis(100)).await;
    assert_eq!(store.fetch_count(Table::Evidence), 1);
}

#[tokio::test]
async fn test_shutdown_closes_every_subscription() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    let (engine, sink) = engine(&store);

    let mut execution = engine.subscribe_execution(TEST_EXECUTION_ID);
    let mut node = engine.subscribe_node(TEST_NODE_ID);
    next_update(&mut execution).await;
    next_update(&mut node).await;

    engine.shutdown().await;

    assert!(execution.next().await.is_none());
    assert!(node.next().await.is_none());
    assert_eq!(execution.state(), SubscriptionState::Closed);
    assert_eq!(engine.active_executions(), 0);
    assert_eq!(engine.active_nodes(), 0);
    assert_eq!(sink.events_of_type("sync.closed").len(), 2);
    assert_eq!(store.active_feeds(), 0);
}

#[tokio::test]
async fn test_unreachable_store_publishes_nothing() {
    let mut store = MockEvidenceStore::new();
    store
        .expect_fetch_execution()
        .returning(|_| Err(StoreError::unavailable("connection refused")));
    store.expect_fetch_evidence().returning(|_| Ok(Vec::new()));
    store.expect_fetch_approvals().returning(|_| Ok(Vec::new()));
    store.expect_fetch_deployments().returning(|_| Ok(Vec::new()));

    let feed = Arc::new(InMemoryEvidenceStore::new());
    let sink = Arc::new(CollectingEventSink::new());
    let engine = ReconciliationEngine::builder(Arc::new(store), feed)
        .config(fast_config())
        .event_sink(sink.clone())
        .build()
        .unwrap();

    let handle = engine.subscribe_execution(TEST_EXECUTION_ID);
    wait_for(|| sink.events_of_type("sync.fetch_failed").len() >= 3).await;

    assert!(handle.latest().is_none());
    assert_eq!(
        engine.execution_state(TEST_EXECUTION_ID),
        Some(SubscriptionState::Degraded)
    );
    assert!(sink.events_of_type("sync.snapshot_published").is_empty());
}

#[tokio::test]
async fn test_missing_rows_do_not_extend_backoff() {
    let mut store = MockEvidenceStore::new();
    store.expect_fetch_execution().returning(|id| {
        Err(StoreError::NotFound {
            table: Table::Executions,
            id: id.to_string(),
        })
    });
    store.expect_fetch_evidence().returning(|_| Ok(Vec::new()));
    store.expect_fetch_approvals().returning(|_| Ok(Vec::new()));
    store.expect_fetch_deployments().returning(|_| Ok(Vec::new()));

    let feed = Arc::new(InMemoryEvidenceStore::new());
    let sink = Arc::new(CollectingEventSink::new());
    let engine = ReconciliationEngine::builder(Arc::new(store), feed)
        .config(fast_config())
        .event_sink(sink.clone())
        .build()
        .unwrap();

    let handle = engine.subscribe_execution(TEST_EXECUTION_ID);
    wait_for(|| sink.events_of_type("sync.fetch_failed").len() >= 3).await;

    for event in sink.events_of_type("sync.fetch_failed") {
        assert_eq!(event.payload()["consecutive_failures"], 0);
    }
    assert!(handle.latest().is_none());
    assert!(sink.events_of_type("sync.snapshot_published").is_empty());
}

#[test]
fn test_builder_rejects_invalid_config() {
    let store = Arc::new(InMemoryEvidenceStore::new());
    let result = ReconciliationEngine::builder(store.clone(), store)
        .config(SyncConfig::new().with_poll_interval_ms(0))
        .build();
    assert!(result.is_err());
}
