//! Lifecycle events emitted by subscription workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::{ScopeKind, SubscriptionState};

/// What happened to a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEventKind {
    /// The worker moved between lifecycle states.
    StateChanged {
        /// Previous state.
        from: SubscriptionState,
        /// New state.
        to: SubscriptionState,
    },
    /// A new value reached the cache and its subscribers.
    SnapshotPublished {
        /// Revision of the published value.
        revision: u64,
        /// Whether the value was published as stale.
        stale: bool,
    },
    /// A fetch of the input set failed or timed out.
    FetchFailed {
        /// Error message.
        error: String,
        /// Failures since the last successful fetch.
        consecutive_failures: u32,
    },
    /// The last subscriber left.
    Closed,
}

/// A lifecycle event of one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Execution or node.
    pub scope: ScopeKind,
    /// Execution or node id.
    pub id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Event details.
    #[serde(flatten)]
    pub kind: SyncEventKind,
}

impl SyncEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(scope: ScopeKind, id: impl Into<String>, kind: SyncEventKind) -> Self {
        Self {
            scope,
            id: id.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Dotted event type, e.g. `sync.state_changed`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            SyncEventKind::StateChanged { .. } => "sync.state_changed",
            SyncEventKind::SnapshotPublished { .. } => "sync.snapshot_published",
            SyncEventKind::FetchFailed { .. } => "sync.fetch_failed",
            SyncEventKind::Closed => "sync.closed",
        }
    }

    /// JSON payload of the event.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
