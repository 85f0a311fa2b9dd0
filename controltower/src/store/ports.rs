//! Collaborator contracts: the evidence store read API and its change feed.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{ApprovalRequest, DeploymentRecord, EvidenceRecord, Execution, TelemetrySignal};
use crate::errors::StoreError;

/// Source tables the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Execution rows, keyed by execution id.
    Executions,
    /// Evidence records, keyed by execution id.
    Evidence,
    /// Approval requests, keyed by execution id.
    Approvals,
    /// Deployment records, keyed by execution id.
    Deployments,
    /// Telemetry signals, keyed by node id.
    Signals,
}

impl Table {
    /// Tables that contribute to an execution snapshot.
    pub const EXECUTION_TABLES: [Self; 4] = [
        Self::Executions,
        Self::Evidence,
        Self::Approvals,
        Self::Deployments,
    ];

    /// Tables that contribute to a node badge.
    pub const NODE_TABLES: [Self; 1] = [Self::Signals];

    /// Returns the table name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Executions => "executions",
            Self::Evidence => "evidence",
            Self::Approvals => "approvals",
            Self::Deployments => "deployments",
            Self::Signals => "signals",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A "something changed" event. Carries no row data: receivers re-fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeNotice {
    /// Table that changed.
    pub table: Table,
    /// Execution or node id the change is scoped to.
    pub scope_id: String,
}

impl ChangeNotice {
    /// Creates a notice.
    #[must_use]
    pub fn new(table: Table, scope_id: impl Into<String>) -> Self {
        Self {
            table,
            scope_id: scope_id.into(),
        }
    }
}

/// Stream of notices for one table and scope. The stream ending means the
/// channel disconnected.
pub type ChangeStream = BoxStream<'static, ChangeNotice>;

/// Read API of the evidence store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Fetches the execution row.
    async fn fetch_execution(&self, execution_id: &str) -> Result<Option<Execution>, StoreError>;

    /// Fetches all evidence records of an execution.
    async fn fetch_evidence(&self, execution_id: &str) -> Result<Vec<EvidenceRecord>, StoreError>;

    /// Fetches all approval requests of an execution.
    async fn fetch_approvals(&self, execution_id: &str)
        -> Result<Vec<ApprovalRequest>, StoreError>;

    /// Fetches all deployment records of an execution.
    async fn fetch_deployments(
        &self,
        execution_id: &str,
    ) -> Result<Vec<DeploymentRecord>, StoreError>;

    /// Fetches all telemetry signals of a node.
    async fn fetch_signals(&self, node_id: &str) -> Result<Vec<TelemetrySignal>, StoreError>;
}

/// Change-notification API of the evidence store.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a notice stream for one table, filtered to one execution or node id.
    async fn subscribe(&self, table: Table, scope_id: &str) -> Result<ChangeStream, StoreError>;
}
