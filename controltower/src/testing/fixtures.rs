//! Record builders for tests and benchmarks.

use crate::core::{
    ApprovalRequest, ApprovalStatus, DeploymentRecord, DeploymentStatus, EvidenceRecord,
    EvidenceStatus, Execution, ExecutionStatus, SignalKind, StepCategory, TelemetrySignal,
};

/// Execution id used by the single-id helpers.
pub const TEST_EXECUTION_ID: &str = "exec-1";

/// Node id used by [`signal`].
pub const TEST_NODE_ID: &str = "node-1";

/// An evidence record for [`TEST_EXECUTION_ID`].
#[must_use]
pub fn evidence(category: StepCategory, status: EvidenceStatus) -> EvidenceRecord {
    evidence_for(TEST_EXECUTION_ID, category, status)
}

/// An evidence record for any execution.
#[must_use]
pub fn evidence_for(
    execution_id: &str,
    category: StepCategory,
    status: EvidenceStatus,
) -> EvidenceRecord {
    EvidenceRecord::new(execution_id, category, status)
}

/// An approval request for [`TEST_EXECUTION_ID`].
#[must_use]
pub fn approval(status: ApprovalStatus) -> ApprovalRequest {
    ApprovalRequest::new(TEST_EXECUTION_ID, status)
}

/// A production deployment record for [`TEST_EXECUTION_ID`].
#[must_use]
pub fn deployment(status: DeploymentStatus) -> DeploymentRecord {
    DeploymentRecord::new(TEST_EXECUTION_ID, "production", status)
}

/// A telemetry signal for [`TEST_NODE_ID`].
#[must_use]
pub fn signal(kind: SignalKind) -> TelemetrySignal {
    TelemetrySignal::new(TEST_NODE_ID, kind)
}

/// Builder for execution rows.
#[derive(Debug, Clone)]
pub struct ExecutionBuilder {
    execution: Execution,
}

impl Default for ExecutionBuilder {
    fn default() -> Self {
        Self::new(TEST_EXECUTION_ID)
    }
}

impl ExecutionBuilder {
    /// Starts a running execution.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            execution: Execution::new(id),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.execution.name = name.into();
        self
    }

    /// Sets the orchestrator status.
    #[must_use]
    pub fn status(mut self, status: ExecutionStatus) -> Self {
        self.execution.status = status;
        self
    }

    /// Records a commit on a branch.
    #[must_use]
    pub fn commit(mut self, hash: impl Into<String>, branch: impl Into<String>) -> Self {
        self.execution.commit_hash = Some(hash.into());
        self.execution.branch = Some(branch.into());
        self
    }

    /// Sets the target environment.
    #[must_use]
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.execution.environment = Some(environment.into());
        self
    }

    /// Sets the orchestrator's progress override.
    #[must_use]
    pub fn progress_override(mut self, progress: u8) -> Self {
        self.execution.progress_override = Some(progress);
        self
    }

    /// Builds the execution row.
    #[must_use]
    pub fn build(self) -> Execution {
        self.execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let execution = ExecutionBuilder::default().build();
        assert_eq!(execution.id, TEST_EXECUTION_ID);
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert!(!execution.has_commit());
    }

    #[test]
    fn test_builder_commit() {
        let execution = ExecutionBuilder::new("exec-9")
            .commit("deadbeef", "main")
            .status(ExecutionStatus::Paused)
            .build();
        assert!(execution.has_commit());
        assert_eq!(execution.branch.as_deref(), Some("main"));
        assert_eq!(execution.status, ExecutionStatus::Paused);
    }
}
