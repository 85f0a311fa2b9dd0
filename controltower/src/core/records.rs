//! Source rows read from the evidence store.
//!
//! Every enum here tolerates values it does not know: they deserialize into
//! an `Unknown` variant instead of failing the whole fetch, and the
//! aggregators treat such rows as absent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ExecutionStatus;

/// One pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Execution identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Orchestrator-level lifecycle status.
    #[serde(default)]
    pub status: ExecutionStatus,
    /// Source branch.
    #[serde(default)]
    pub branch: Option<String>,
    /// Source revision.
    #[serde(default)]
    pub commit_hash: Option<String>,
    /// Target environment.
    #[serde(default)]
    pub environment: Option<String>,
    /// When the run started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Fine-grained progress reported by the orchestrator, 0-100.
    #[serde(default)]
    pub progress_override: Option<u8>,
}

impl Execution {
    /// Creates a running execution with no source metadata.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            status: ExecutionStatus::Running,
            branch: None,
            commit_hash: None,
            environment: None,
            started_at: None,
            progress_override: None,
        }
    }

    /// Returns true if a non-blank commit hash is recorded.
    #[must_use]
    pub fn has_commit(&self) -> bool {
        self.commit_hash
            .as_deref()
            .is_some_and(|hash| !hash.trim().is_empty())
    }
}

/// The kind of tool that produced an evidence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    /// Test run.
    Test,
    /// Build.
    Build,
    /// Static analysis.
    Sast,
    /// Secret scanning.
    Secrets,
    /// Dependency audit.
    Dependency,
    /// Generic security scan.
    Scan,
    /// Artifact signing.
    Sign,
    /// Any category the engine does not recognise.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for StepCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Test => write!(f, "test"),
            Self::Build => write!(f, "build"),
            Self::Sast => write!(f, "sast"),
            Self::Secrets => write!(f, "secrets"),
            Self::Dependency => write!(f, "dependency"),
            Self::Scan => write!(f, "scan"),
            Self::Sign => write!(f, "sign"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Lifecycle status of one evidence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    /// Check passed.
    Passed,
    /// Check failed.
    Failed,
    /// Check in progress.
    Running,
    /// Check queued.
    Pending,
    /// Any value the engine does not recognise.
    #[serde(other)]
    Unknown,
}

/// One observation from a build, test or scan tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Owning execution.
    pub execution_id: String,
    /// Step category.
    pub category: StepCategory,
    /// Record status.
    pub status: EvidenceStatus,
    /// Tool or check label.
    #[serde(default)]
    pub name: Option<String>,
    /// Wall-clock duration in milliseconds.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Store-assigned ordering key, increasing with insertion time.
    #[serde(default)]
    pub ordering_key: i64,
}

impl EvidenceRecord {
    /// Creates a record with no duration and ordering key zero.
    #[must_use]
    pub fn new(
        execution_id: impl Into<String>,
        category: StepCategory,
        status: EvidenceStatus,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            category,
            status,
            name: None,
            duration_ms: None,
            ordering_key: 0,
        }
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the ordering key.
    #[must_use]
    pub fn with_ordering_key(mut self, key: i64) -> Self {
        self.ordering_key = key;
        self
    }

    /// Sets the check label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns false if the status value was not understood.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.status != EvidenceStatus::Unknown
    }
}

/// Lifecycle status of an approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting on a reviewer.
    Pending,
    /// Approved.
    Approved,
    /// Rejected.
    Rejected,
    /// Any value the engine does not recognise.
    #[serde(other)]
    Unknown,
}

/// A governance gate tied to an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Owning execution.
    pub execution_id: String,
    /// Gate status.
    pub status: ApprovalStatus,
    /// Who asked for the approval.
    #[serde(default)]
    pub requested_by: Option<String>,
}

impl ApprovalRequest {
    /// Creates an approval request.
    #[must_use]
    pub fn new(execution_id: impl Into<String>, status: ApprovalStatus) -> Self {
        Self {
            execution_id: execution_id.into(),
            status,
            requested_by: None,
        }
    }
}

/// Lifecycle status of a deployment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Rollout in progress.
    Running,
    /// Rollout finished.
    Success,
    /// Rollout failed.
    Failed,
    /// Any value the engine does not recognise.
    #[serde(other)]
    Unknown,
}

/// One deployment attempt of an execution to an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Owning execution.
    pub execution_id: String,
    /// Target environment.
    #[serde(default)]
    pub environment: String,
    /// Attempt status.
    pub status: DeploymentStatus,
    /// Version label.
    #[serde(default)]
    pub version: Option<String>,
    /// When the attempt was recorded.
    #[serde(default)]
    pub deployed_at: Option<DateTime<Utc>>,
}

impl DeploymentRecord {
    /// Creates a deployment record for an environment.
    #[must_use]
    pub fn new(
        execution_id: impl Into<String>,
        environment: impl Into<String>,
        status: DeploymentStatus,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            environment: environment.into(),
            status,
            version: None,
            deployed_at: None,
        }
    }

    /// Sets the version label.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn with_deployed_at(mut self, at: DateTime<Utc>) -> Self {
        self.deployed_at = Some(at);
        self
    }
}

/// The kind of a telemetry signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Distributed trace span.
    Trace,
    /// Log line.
    Log,
    /// Metric sample.
    Metric,
    /// Any value the engine does not recognise.
    #[serde(other)]
    Unknown,
}

/// OpenTelemetry-style status code of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusCode {
    /// Completed normally.
    Ok,
    /// Completed with an error.
    Error,
    /// Explicitly unset.
    Unset,
    /// Any value the engine does not recognise.
    #[serde(other)]
    Unknown,
}

/// One telemetry observation tied to a deployable node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySignal {
    /// Owning node.
    pub node_id: String,
    /// Signal kind.
    pub kind: SignalKind,
    /// Status code, absent when the producer did not set one.
    #[serde(default)]
    pub status_code: Option<StatusCode>,
}

impl TelemetrySignal {
    /// Creates a signal with no status code.
    #[must_use]
    pub fn new(node_id: impl Into<String>, kind: SignalKind) -> Self {
        Self {
            node_id: node_id.into(),
            kind,
            status_code: None,
        }
    }

    /// Sets the status code.
    #[must_use]
    pub fn with_status(mut self, code: StatusCode) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Returns true if the signal reports an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status_code == Some(StatusCode::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_execution_has_commit() {
        let mut execution = Execution::new("exec-1");
        assert!(!execution.has_commit());

        execution.commit_hash = Some("   ".to_string());
        assert!(!execution.has_commit());

        execution.commit_hash = Some("a1b2c3d".to_string());
        assert!(execution.has_commit());
    }

    #[test]
    fn test_evidence_unknown_status_is_malformed() {
        let record: EvidenceRecord = serde_json::from_value(serde_json::json!({
            "execution_id": "exec-1",
            "category": "test",
            "status": "exploded",
        }))
        .unwrap();

        assert_eq!(record.status, EvidenceStatus::Unknown);
        assert!(!record.is_well_formed());
        assert_eq!(record.duration_ms, None);
    }

    #[test]
    fn test_unknown_category_deserializes() {
        let record: EvidenceRecord = serde_json::from_value(serde_json::json!({
            "execution_id": "exec-1",
            "category": "lint",
            "status": "passed",
            "duration_ms": 12,
            "ordering_key": 3,
        }))
        .unwrap();

        assert_eq!(record.category, StepCategory::Unknown);
        assert_eq!(record.ordering_key, 3);
    }

    #[test]
    fn test_signal_status_code_wire_names() {
        let signal: TelemetrySignal = serde_json::from_value(serde_json::json!({
            "node_id": "node-1",
            "kind": "trace",
            "status_code": "ERROR",
        }))
        .unwrap();
        assert!(signal.is_error());

        let unset: TelemetrySignal = serde_json::from_value(serde_json::json!({
            "node_id": "node-1",
            "kind": "log",
            "status_code": null,
        }))
        .unwrap();
        assert_eq!(unset.status_code, None);
        assert!(!unset.is_error());
    }

    #[test]
    fn test_step_category_display() {
        assert_eq!(StepCategory::Dependency.to_string(), "dependency");
        assert_eq!(StepCategory::Sign.to_string(), "sign");
    }
}
