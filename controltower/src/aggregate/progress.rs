//! Progress calculator.

use crate::core::{StageId, StageState, StageStatus, STAGE_COUNT};

/// Completion percentage over the canonical stages.
///
/// `round(passed / 8 * 100)` with halves rounding up, unless the
/// orchestrator supplied an override, which wins (clamped to 100).
#[must_use]
pub fn progress(stages: &[StageState], progress_override: Option<u8>) -> u8 {
    if let Some(value) = progress_override {
        return value.min(100);
    }

    let passed = stages
        .iter()
        .filter(|stage| stage.status == StageStatus::Passed)
        .count()
        .min(STAGE_COUNT);
    let percent = (passed * 100 + STAGE_COUNT / 2) / STAGE_COUNT;
    u8::try_from(percent).unwrap_or(100)
}

/// First stage in canonical order that is running.
#[must_use]
pub fn active_stage(stages: &[StageState]) -> Option<StageId> {
    StageId::ALL.into_iter().find(|id| {
        stages
            .iter()
            .any(|stage| stage.id == *id && stage.status == StageStatus::Running)
    })
}
