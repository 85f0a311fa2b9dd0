//! The eight canonical stages and their derived state.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::StageStatus;

/// One canonical phase of an execution, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Source revision recorded.
    Commit,
    /// Build and tests.
    Ci,
    /// Security checks.
    Security,
    /// Build output and signature.
    Artifact,
    /// Governance gates.
    Approval,
    /// Deployment.
    Cd,
    /// Running in the target environment.
    Runtime,
    /// Execution confirmed successful.
    Verified,
}

/// Number of canonical stages.
pub const STAGE_COUNT: usize = 8;

impl StageId {
    /// All stages in canonical order.
    pub const ALL: [Self; STAGE_COUNT] = [
        Self::Commit,
        Self::Ci,
        Self::Security,
        Self::Artifact,
        Self::Approval,
        Self::Cd,
        Self::Runtime,
        Self::Verified,
    ];

    /// Returns the wire name of the stage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Ci => "ci",
            Self::Security => "security",
            Self::Artifact => "artifact",
            Self::Approval => "approval",
            Self::Cd => "cd",
            Self::Runtime => "runtime",
            Self::Verified => "verified",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage-specific detail shown next to the status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageDetail {
    /// No extra detail.
    #[default]
    None,
    /// Source revision.
    Commit {
        /// Commit hash, if recorded.
        hash: Option<String>,
        /// Branch, if recorded.
        branch: Option<String>,
    },
    /// Check counts for classifier-backed stages.
    Checks {
        /// Well-formed records considered.
        total: usize,
        /// Records that passed.
        passed: usize,
    },
    /// Signature presence for the artifact stage.
    Artifact {
        /// True if any signing record exists.
        signed: bool,
    },
    /// Gate counts.
    Approval {
        /// Requests awaiting review.
        pending: usize,
        /// Approved requests.
        approved: usize,
        /// Rejected requests.
        rejected: usize,
    },
    /// Most recent deployment attempt.
    Deployment {
        /// Version label of the latest attempt.
        version: Option<String>,
        /// Environment of the latest attempt.
        environment: Option<String>,
    },
}

/// The derived state of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageState {
    /// Which stage.
    pub id: StageId,
    /// Derived status.
    pub status: StageStatus,
    /// Sum of contributing durations.
    pub duration_ms: Option<u64>,
    /// Stage-specific detail.
    #[serde(default)]
    pub detail: StageDetail,
}

impl StageState {
    /// Creates a stage state with no duration or detail.
    #[must_use]
    pub fn new(id: StageId, status: StageStatus) -> Self {
        Self {
            id,
            status,
            duration_ms: None,
            detail: StageDetail::None,
        }
    }

    /// Sets the aggregate duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: Option<u64>) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Sets the detail.
    #[must_use]
    pub fn with_detail(mut self, detail: StageDetail) -> Self {
        self.detail = detail;
        self
    }
}
