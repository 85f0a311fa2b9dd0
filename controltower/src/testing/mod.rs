//! Testing utilities for the reconciliation engine.
//!
//! This module provides record builders shared by unit tests, the
//! synchronization integration tests and the benchmarks.

mod fixtures;

pub use fixtures::{
    approval, deployment, evidence, evidence_for, signal, ExecutionBuilder, TEST_EXECUTION_ID,
    TEST_NODE_ID,
};
