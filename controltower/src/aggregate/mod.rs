//! Pure status derivation.
//!
//! This module provides:
//! - Ordered predicate tables used for every precedence decision
//! - The stage classifier for category groups of evidence
//! - The status aggregator producing the eight canonical stages
//! - The progress calculator and active-stage lookup
//! - The node telemetry badge aggregator
//!
//! Nothing here awaits or touches shared state.

mod classifier;
mod progress;
pub mod rules;
mod stages;
mod telemetry;

pub use classifier::{
    classify, classify_categories, Classification, StatusTally, ARTIFACT_CATEGORIES,
    CATEGORY_RULES, CI_CATEGORIES, SECURITY_CATEGORIES,
};
pub use progress::{active_stage, progress};
pub use stages::{
    aggregate_stages, build_snapshot, ApprovalTally, ArtifactFacts, DeploymentTally,
    ExecutionInputs, RuntimeFacts, APPROVAL_RULES, ARTIFACT_RULES, DEPLOYMENT_RULES,
    RUNTIME_RULES, VERIFIED_RULES,
};
pub use telemetry::telemetry_badge;
