//! Stage classifier: one category group of evidence → one status.

use serde::{Deserialize, Serialize};

use super::rules::{evaluate, Rule};
use crate::core::{EvidenceRecord, EvidenceStatus, StageStatus, StepCategory};

/// Categories feeding the `ci` stage.
pub const CI_CATEGORIES: &[StepCategory] = &[StepCategory::Test, StepCategory::Build];

/// Categories feeding the `security` stage.
pub const SECURITY_CATEGORIES: &[StepCategory] = &[
    StepCategory::Sast,
    StepCategory::Secrets,
    StepCategory::Dependency,
    StepCategory::Scan,
];

/// Categories feeding the `artifact` stage.
pub const ARTIFACT_CATEGORIES: &[StepCategory] = &[StepCategory::Build, StepCategory::Sign];

/// Per-status counts over a set of well-formed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusTally {
    /// Records counted.
    pub total: usize,
    /// Passed records.
    pub passed: usize,
    /// Failed records.
    pub failed: usize,
    /// Running records.
    pub running: usize,
    /// Pending records.
    pub pending: usize,
}

impl StatusTally {
    /// Counts one record. Records with an unknown status are ignored.
    pub fn record(&mut self, status: EvidenceStatus) {
        match status {
            EvidenceStatus::Passed => self.passed += 1,
            EvidenceStatus::Failed => self.failed += 1,
            EvidenceStatus::Running => self.running += 1,
            EvidenceStatus::Pending => self.pending += 1,
            EvidenceStatus::Unknown => return,
        }
        self.total += 1;
    }
}

/// Precedence for a category group: a single failure surfaces immediately,
/// and a running check is never masked by passed siblings.
pub const CATEGORY_RULES: &[Rule<StatusTally>] = &[
    Rule {
        name: "empty",
        when: |t: &StatusTally| t.total == 0,
        then: StageStatus::Pending,
    },
    Rule {
        name: "any_failed",
        when: |t: &StatusTally| t.failed > 0,
        then: StageStatus::Failed,
    },
    Rule {
        name: "any_running",
        when: |t: &StatusTally| t.running > 0,
        then: StageStatus::Running,
    },
    Rule {
        name: "all_passed",
        when: |t: &StatusTally| t.passed == t.total,
        then: StageStatus::Passed,
    },
];

/// Result of classifying one category group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Category status, never `skipped`.
    pub status: StageStatus,
    /// Sum of the non-null durations, `None` if no record carried one.
    pub duration_ms: Option<u64>,
    /// Well-formed records considered.
    pub total: usize,
    /// Records that passed.
    pub passed: usize,
}

/// Classifies an already-filtered set of records.
///
/// Records with an unrecognised status are treated as absent.
#[must_use]
pub fn classify<'a, I>(records: I) -> Classification
where
    I: IntoIterator<Item = &'a EvidenceRecord>,
{
    let mut tally = StatusTally::default();
    let mut duration_ms: Option<u64> = None;

    for record in records.into_iter().filter(|r| r.is_well_formed()) {
        tally.record(record.status);
        if let Some(ms) = record.duration_ms {
            duration_ms = Some(duration_ms.unwrap_or(0).saturating_add(ms));
        }
    }

    Classification {
        status: evaluate(CATEGORY_RULES, &tally, StageStatus::Pending),
        duration_ms,
        total: tally.total,
        passed: tally.passed,
    }
}

/// Filters `records` to `categories` and classifies the result.
#[must_use]
pub fn classify_categories(
    records: &[EvidenceRecord],
    categories: &[StepCategory],
) -> Classification {
    classify(
        records
            .iter()
            .filter(|record| categories.contains(&record.category)),
    )
}
