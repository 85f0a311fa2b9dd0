//! Benchmarks for snapshot derivation.

use controltower::aggregate::{build_snapshot, telemetry_badge, ExecutionInputs};
use controltower::core::{
    ApprovalStatus, DeploymentStatus, EvidenceStatus, SignalKind, StatusCode, StepCategory,
};
use controltower::testing::{
    approval, deployment, evidence, signal, ExecutionBuilder, TEST_EXECUTION_ID,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const CATEGORIES: [StepCategory; 7] = [
    StepCategory::Test,
    StepCategory::Build,
    StepCategory::Sast,
    StepCategory::Secrets,
    StepCategory::Dependency,
    StepCategory::Scan,
    StepCategory::Sign,
];

fn inputs(records: usize) -> ExecutionInputs {
    let statuses = [
        EvidenceStatus::Passed,
        EvidenceStatus::Running,
        EvidenceStatus::Pending,
        EvidenceStatus::Failed,
    ];
    let evidence = (0..records)
        .map(|i| {
            evidence(CATEGORIES[i % CATEGORIES.len()], statuses[i % statuses.len()])
                .with_duration_ms(10 + i as u64)
                .with_ordering_key(i as i64)
        })
        .collect();

    ExecutionInputs {
        execution: Some(ExecutionBuilder::new(TEST_EXECUTION_ID).commit("abc123", "main").build()),
        evidence,
        approvals: vec![approval(ApprovalStatus::Pending), approval(ApprovalStatus::Approved)],
        deployments: vec![
            deployment(DeploymentStatus::Failed),
            deployment(DeploymentStatus::Success),
        ],
    }
}

fn snapshot_benchmark(c: &mut Criterion) {
    for size in [10, 100, 1_000] {
        let inputs = inputs(size);
        c.bench_function(&format!("build_snapshot/{size}"), |b| {
            b.iter(|| build_snapshot(black_box(TEST_EXECUTION_ID), black_box(&inputs)));
        });
    }
}

fn badge_benchmark(c: &mut Criterion) {
    let signals: Vec<_> = (0..1_000)
        .map(|i| match i % 3 {
            0 => signal(SignalKind::Trace),
            1 => signal(SignalKind::Log).with_status(StatusCode::Ok),
            _ => signal(SignalKind::Metric),
        })
        .collect();

    c.bench_function("telemetry_badge/1000", |b| {
        b.iter(|| telemetry_badge(black_box(&signals)));
    });
}

criterion_group!(benches, snapshot_benchmark, badge_benchmark);
criterion_main!(benches);
