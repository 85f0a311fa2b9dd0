//! View-models handed to the presentation layer.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{StageId, StageState, StageStatus};

/// The complete derived view of one execution at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    /// Execution identifier.
    pub execution_id: String,
    /// The eight stages in canonical order.
    pub stages: Vec<StageState>,
    /// Completion percentage, 0-100.
    pub progress: u8,
    /// First running stage, if any.
    pub active_stage: Option<StageId>,
}

impl ExecutionSnapshot {
    /// Returns the state of one stage.
    #[must_use]
    pub fn stage(&self, id: StageId) -> Option<&StageState> {
        self.stages.iter().find(|stage| stage.id == id)
    }

    /// Returns the status of one stage, `pending` if it is missing.
    #[must_use]
    pub fn status_of(&self, id: StageId) -> StageStatus {
        self.stage(id).map(|stage| stage.status).unwrap_or_default()
    }

    /// Hex SHA-256 of the canonical JSON encoding.
    ///
    /// Identical snapshots always produce identical fingerprints, so the
    /// value can be used as an ETag by consumers.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        fingerprint(self)
    }
}

/// Count-and-flag projection of a node's telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TelemetryBadge {
    /// Number of trace signals.
    pub trace_count: usize,
    /// Number of log signals.
    pub log_count: usize,
    /// Number of metric signals.
    pub metric_count: usize,
    /// True if any signal carries an `ERROR` status code.
    pub has_errors: bool,
}

impl TelemetryBadge {
    /// Total number of recognised signals.
    #[must_use]
    pub fn total(&self) -> usize {
        self.trace_count + self.log_count + self.metric_count
    }
}

/// A cached value plus the freshness metadata the cache attaches to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracked<T> {
    /// The derived value.
    pub data: T,
    /// True once refreshes have failed repeatedly; the data is the last good value.
    pub stale: bool,
    /// Increments on every published change, starting at 1.
    pub revision: u64,
}

impl<T> Tracked<T> {
    /// Returns true if the payload and staleness match, ignoring the revision.
    #[must_use]
    pub fn same_content(&self, data: &T, stale: bool) -> bool
    where
        T: PartialEq,
    {
        self.stale == stale && self.data == *data
    }
}

/// Hex SHA-256 of a value's JSON encoding.
pub fn fingerprint<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
