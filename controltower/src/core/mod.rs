//! Core domain model types for the reconciliation engine.
//!
//! This module contains:
//! - Source rows read from the evidence store
//! - Stage and execution status enums
//! - The canonical stage list and derived stage state
//! - Snapshot view-models handed to consumers

mod records;
mod snapshot;
mod stage;
mod status;

pub use records::{
    ApprovalRequest, ApprovalStatus, DeploymentRecord, DeploymentStatus, EvidenceRecord,
    EvidenceStatus, Execution, SignalKind, StatusCode, StepCategory, TelemetrySignal,
};
pub use snapshot::{fingerprint, ExecutionSnapshot, TelemetryBadge, Tracked};
pub use stage::{StageDetail, StageId, StageState, STAGE_COUNT};
pub use status::{ExecutionStatus, StageStatus};
