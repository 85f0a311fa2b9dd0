//! Projections: which tables a subscription reads and how it derives its value.
//!
//! The worker is generic over a projection, so executions and nodes share
//! one fetch/debounce/poll loop while keeping their own inputs and output.

use async_trait::async_trait;
use std::fmt;
use tracing::warn;

use super::state::ScopeKind;
use crate::aggregate::{build_snapshot, telemetry_badge, ExecutionInputs};
use crate::core::{
    ApprovalStatus, DeploymentStatus, ExecutionSnapshot, ExecutionStatus, SignalKind,
    TelemetryBadge, TelemetrySignal,
};
use crate::errors::StoreError;
use crate::store::{EvidenceStore, Table};

/// A derived view over a set of store tables.
#[async_trait]
pub trait Projection: Send + Sync + 'static {
    /// Raw rows held by the worker between refreshes.
    type Inputs: Default + Send + Sync + 'static;
    /// The value published to subscribers.
    type Output: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// What the subscription id refers to.
    const SCOPE: ScopeKind;

    /// Tables contributing to the output.
    fn tables(&self) -> &'static [Table];

    /// Replaces the rows of one table in `inputs` with a fresh fetch.
    async fn fetch_table(
        &self,
        store: &dyn EvidenceStore,
        id: &str,
        table: Table,
        inputs: &mut Self::Inputs,
    ) -> Result<(), StoreError>;

    /// Derives the output from the current inputs.
    fn compute(&self, id: &str, inputs: &Self::Inputs) -> Self::Output;
}

fn warn_malformed(scope: ScopeKind, id: &str, table: Table, malformed: usize) {
    if malformed > 0 {
        warn!(
            %scope,
            id,
            %table,
            malformed,
            "Ignoring rows with unrecognised status values"
        );
    }
}

/// Execution snapshot: four tables, eight stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionProjection;

#[async_trait]
impl Projection for ExecutionProjection {
    type Inputs = ExecutionInputs;
    type Output = ExecutionSnapshot;

    const SCOPE: ScopeKind = ScopeKind::Execution;

    fn tables(&self) -> &'static [Table] {
        &Table::EXECUTION_TABLES
    }

    async fn fetch_table(
        &self,
        store: &dyn EvidenceStore,
        id: &str,
        table: Table,
        inputs: &mut ExecutionInputs,
    ) -> Result<(), StoreError> {
        let malformed = match table {
            Table::Executions => {
                inputs.execution = store.fetch_execution(id).await?;
                usize::from(
                    inputs
                        .execution
                        .as_ref()
                        .is_some_and(|e| e.status == ExecutionStatus::Unknown),
                )
            }
            Table::Evidence => {
                inputs.evidence = store.fetch_evidence(id).await?;
                inputs.evidence.iter().filter(|r| !r.is_well_formed()).count()
            }
            Table::Approvals => {
                inputs.approvals = store.fetch_approvals(id).await?;
                inputs
                    .approvals
                    .iter()
                    .filter(|a| a.status == ApprovalStatus::Unknown)
                    .count()
            }
            Table::Deployments => {
                inputs.deployments = store.fetch_deployments(id).await?;
                inputs
                    .deployments
                    .iter()
                    .filter(|d| d.status == DeploymentStatus::Unknown)
                    .count()
            }
            Table::Signals => 0,
        };
        warn_malformed(Self::SCOPE, id, table, malformed);
        Ok(())
    }

    fn compute(&self, id: &str, inputs: &ExecutionInputs) -> ExecutionSnapshot {
        build_snapshot(id, inputs)
    }
}

/// Node telemetry badge: one table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryProjection;

#[async_trait]
impl Projection for TelemetryProjection {
    type Inputs = Vec<TelemetrySignal>;
    type Output = TelemetryBadge;

    const SCOPE: ScopeKind = ScopeKind::Node;

    fn tables(&self) -> &'static [Table] {
        &Table::NODE_TABLES
    }

    async fn fetch_table(
        &self,
        store: &dyn EvidenceStore,
        id: &str,
        table: Table,
        inputs: &mut Vec<TelemetrySignal>,
    ) -> Result<(), StoreError> {
        if table != Table::Signals {
            return Ok(());
        }
        *inputs = store.fetch_signals(id).await?;
        let malformed = inputs
            .iter()
            .filter(|s| s.kind == SignalKind::Unknown)
            .count();
        warn_malformed(Self::SCOPE, id, table, malformed);
        Ok(())
    }

    fn compute(&self, _id: &str, inputs: &Vec<TelemetrySignal>) -> TelemetryBadge {
        telemetry_badge(inputs)
    }
}
