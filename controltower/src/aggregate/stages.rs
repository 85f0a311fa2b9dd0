//! Status aggregator: raw execution inputs → the eight canonical stages.
//!
//! Each stage is derived from raw inputs only, never from another stage's
//! derived status, so a stale stage can never cascade into its neighbours.

use serde::{Deserialize, Serialize};

use super::classifier::{
    classify_categories, StatusTally, ARTIFACT_CATEGORIES, CI_CATEGORIES, SECURITY_CATEGORIES,
};
use super::progress::{active_stage, progress};
use super::rules::{evaluate, Rule};
use crate::core::{
    ApprovalRequest, ApprovalStatus, DeploymentRecord, DeploymentStatus, EvidenceRecord,
    EvidenceStatus, Execution, ExecutionSnapshot, ExecutionStatus, StageDetail, StageId,
    StageState, StageStatus, StepCategory,
};

/// Everything the aggregator reads for one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionInputs {
    /// The execution row, if the orchestrator has written it yet.
    pub execution: Option<Execution>,
    /// All evidence records.
    pub evidence: Vec<EvidenceRecord>,
    /// All approval requests.
    pub approvals: Vec<ApprovalRequest>,
    /// All deployment records.
    pub deployments: Vec<DeploymentRecord>,
}

impl ExecutionInputs {
    /// Number of rows carrying a status value the engine does not understand.
    #[must_use]
    pub fn malformed_count(&self) -> usize {
        let execution = usize::from(
            self.execution
                .as_ref()
                .is_some_and(|e| e.status == ExecutionStatus::Unknown),
        );
        execution
            + self.evidence.iter().filter(|r| !r.is_well_formed()).count()
            + self
                .approvals
                .iter()
                .filter(|a| a.status == ApprovalStatus::Unknown)
                .count()
            + self
                .deployments
                .iter()
                .filter(|d| d.status == DeploymentStatus::Unknown)
                .count()
    }
}

/// Counts over the approval requests of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApprovalTally {
    /// Awaiting review.
    pub pending: usize,
    /// Approved.
    pub approved: usize,
    /// Rejected.
    pub rejected: usize,
}

impl ApprovalTally {
    fn from_requests(requests: &[ApprovalRequest]) -> Self {
        let mut tally = Self::default();
        for request in requests {
            match request.status {
                ApprovalStatus::Pending => tally.pending += 1,
                ApprovalStatus::Approved => tally.approved += 1,
                ApprovalStatus::Rejected => tally.rejected += 1,
                ApprovalStatus::Unknown => {}
            }
        }
        tally
    }
}

/// A single approval unlocks the gate; a rejection outranks open requests.
pub const APPROVAL_RULES: &[Rule<ApprovalTally>] = &[
    Rule {
        name: "any_approved",
        when: |t: &ApprovalTally| t.approved > 0,
        then: StageStatus::Passed,
    },
    Rule {
        name: "any_rejected",
        when: |t: &ApprovalTally| t.rejected > 0,
        then: StageStatus::Failed,
    },
    Rule {
        name: "any_pending",
        when: |t: &ApprovalTally| t.pending > 0,
        then: StageStatus::Running,
    },
];

/// Counts over the deployment attempts of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeploymentTally {
    /// Attempts in progress.
    pub running: usize,
    /// Successful attempts.
    pub success: usize,
    /// Failed attempts.
    pub failed: usize,
}

impl DeploymentTally {
    fn from_records(records: &[DeploymentRecord]) -> Self {
        let mut tally = Self::default();
        for record in records {
            match record.status {
                DeploymentStatus::Running => tally.running += 1,
                DeploymentStatus::Success => tally.success += 1,
                DeploymentStatus::Failed => tally.failed += 1,
                DeploymentStatus::Unknown => {}
            }
        }
        tally
    }
}

/// Any successful rollout counts, even after earlier failed attempts.
pub const DEPLOYMENT_RULES: &[Rule<DeploymentTally>] = &[
    Rule {
        name: "any_success",
        when: |t: &DeploymentTally| t.success > 0,
        then: StageStatus::Passed,
    },
    Rule {
        name: "any_failed",
        when: |t: &DeploymentTally| t.failed > 0,
        then: StageStatus::Failed,
    },
    Rule {
        name: "any_running",
        when: |t: &DeploymentTally| t.running > 0,
        then: StageStatus::Running,
    },
];

/// Inputs of the artifact rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArtifactFacts {
    /// A signing record passed.
    pub sign_passed: bool,
    /// Status of the most recent well-formed build record.
    pub latest_build: Option<EvidenceStatus>,
}

/// A passed signature wins regardless of the build record; otherwise the
/// latest build record decides.
pub const ARTIFACT_RULES: &[Rule<ArtifactFacts>] = &[
    Rule {
        name: "signature_passed",
        when: |f: &ArtifactFacts| f.sign_passed,
        then: StageStatus::Passed,
    },
    Rule {
        name: "build_failed",
        when: |f: &ArtifactFacts| f.latest_build == Some(EvidenceStatus::Failed),
        then: StageStatus::Failed,
    },
    Rule {
        name: "build_running",
        when: |f: &ArtifactFacts| f.latest_build == Some(EvidenceStatus::Running),
        then: StageStatus::Running,
    },
    Rule {
        name: "build_passed",
        when: |f: &ArtifactFacts| f.latest_build == Some(EvidenceStatus::Passed),
        then: StageStatus::Passed,
    },
];

/// Inputs of the runtime and verified rule tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeFacts {
    /// Orchestrator status, `None` if the execution row is missing.
    pub execution: Option<ExecutionStatus>,
    /// Any deployment attempt succeeded.
    pub deployed: bool,
}

/// Runtime follows the orchestrator once it is terminal, and shows a
/// successful rollout as in progress until then.
pub const RUNTIME_RULES: &[Rule<RuntimeFacts>] = &[
    Rule {
        name: "execution_succeeded",
        when: |f: &RuntimeFacts| f.execution == Some(ExecutionStatus::Succeeded),
        then: StageStatus::Passed,
    },
    Rule {
        name: "execution_failed",
        when: |f: &RuntimeFacts| f.execution == Some(ExecutionStatus::Failed),
        then: StageStatus::Failed,
    },
    Rule {
        name: "deployed_not_terminal",
        when: |f: &RuntimeFacts| f.deployed,
        then: StageStatus::Running,
    },
];

/// Verified only ever moves to passed.
pub const VERIFIED_RULES: &[Rule<RuntimeFacts>] = &[Rule {
    name: "execution_succeeded",
    when: |f: &RuntimeFacts| f.execution == Some(ExecutionStatus::Succeeded),
    then: StageStatus::Passed,
}];

fn commit_stage(execution: Option<&Execution>) -> StageState {
    let status = if execution.is_some_and(Execution::has_commit) {
        StageStatus::Passed
    } else {
        StageStatus::Pending
    };
    StageState::new(StageId::Commit, status).with_detail(StageDetail::Commit {
        hash: execution.and_then(|e| e.commit_hash.clone()),
        branch: execution.and_then(|e| e.branch.clone()),
    })
}

fn classified_stage(
    id: StageId,
    records: &[EvidenceRecord],
    categories: &[StepCategory],
) -> StageState {
    let result = classify_categories(records, categories);
    StageState::new(id, result.status)
        .with_duration_ms(result.duration_ms)
        .with_detail(StageDetail::Checks {
            total: result.total,
            passed: result.passed,
        })
}

fn artifact_stage(records: &[EvidenceRecord]) -> StageState {
    let mut sign = StatusTally::default();
    let mut latest_build: Option<&EvidenceRecord> = None;

    for record in records.iter().filter(|r| r.is_well_formed()) {
        match record.category {
            StepCategory::Sign => sign.record(record.status),
            StepCategory::Build => {
                // later rows win ties on the ordering key
                if latest_build.map_or(true, |b| record.ordering_key >= b.ordering_key) {
                    latest_build = Some(record);
                }
            }
            _ => {}
        }
    }

    let facts = ArtifactFacts {
        sign_passed: sign.passed > 0,
        latest_build: latest_build.map(|b| b.status),
    };
    let duration = classify_categories(records, ARTIFACT_CATEGORIES).duration_ms;

    StageState::new(
        StageId::Artifact,
        evaluate(ARTIFACT_RULES, &facts, StageStatus::Pending),
    )
    .with_duration_ms(duration)
    .with_detail(StageDetail::Artifact {
        signed: sign.total > 0,
    })
}

fn approval_stage(requests: &[ApprovalRequest]) -> StageState {
    let tally = ApprovalTally::from_requests(requests);
    StageState::new(
        StageId::Approval,
        evaluate(APPROVAL_RULES, &tally, StageStatus::Pending),
    )
    .with_detail(StageDetail::Approval {
        pending: tally.pending,
        approved: tally.approved,
        rejected: tally.rejected,
    })
}

fn cd_stage(records: &[DeploymentRecord]) -> StageState {
    let tally = DeploymentTally::from_records(records);
    let latest = records
        .iter()
        .filter(|d| d.status != DeploymentStatus::Unknown)
        .max_by_key(|d| d.deployed_at);

    StageState::new(StageId::Cd, evaluate(DEPLOYMENT_RULES, &tally, StageStatus::Pending))
        .with_detail(StageDetail::Deployment {
            version: latest.and_then(|d| d.version.clone()),
            environment: latest.map(|d| d.environment.clone()),
        })
}

fn runtime_facts(inputs: &ExecutionInputs) -> RuntimeFacts {
    RuntimeFacts {
        execution: inputs.execution.as_ref().map(|e| e.status),
        deployed: inputs
            .deployments
            .iter()
            .any(|d| d.status == DeploymentStatus::Success),
    }
}

/// Derives the eight canonical stages, in canonical order.
///
/// Pure and deterministic: identical inputs produce identical output.
#[must_use]
pub fn aggregate_stages(inputs: &ExecutionInputs) -> Vec<StageState> {
    let execution = inputs.execution.as_ref();
    let facts = runtime_facts(inputs);

    vec![
        commit_stage(execution),
        classified_stage(StageId::Ci, &inputs.evidence, CI_CATEGORIES),
        classified_stage(StageId::Security, &inputs.evidence, SECURITY_CATEGORIES),
        artifact_stage(&inputs.evidence),
        approval_stage(&inputs.approvals),
        cd_stage(&inputs.deployments),
        StageState::new(
            StageId::Runtime,
            evaluate(RUNTIME_RULES, &facts, StageStatus::Pending),
        ),
        StageState::new(
            StageId::Verified,
            evaluate(VERIFIED_RULES, &facts, StageStatus::Pending),
        ),
    ]
}

/// Runs the aggregator and progress calculator for one execution.
#[must_use]
pub fn build_snapshot(execution_id: &str, inputs: &ExecutionInputs) -> ExecutionSnapshot {
    let stages = aggregate_stages(inputs);
    let progress_override = inputs.execution.as_ref().and_then(|e| e.progress_override);

    ExecutionSnapshot {
        execution_id: execution_id.to_string(),
        progress: progress(&stages, progress_override),
        active_stage: active_stage(&stages),
        stages,
    }
}
