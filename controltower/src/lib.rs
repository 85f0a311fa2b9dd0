//! # Control Tower
//!
//! Execution status reconciliation engine for CI/CD dashboards.
//!
//! Control Tower turns the raw evidence a pipeline leaves behind (test and
//! scan results, approvals, deployment attempts, telemetry) into one
//! derived view per execution and keeps it current while someone watches:
//!
//! - **Pure derivation**: ordered precedence rules classify evidence into
//!   eight canonical stages plus a progress percentage
//! - **Live synchronization**: one worker per subscribed id re-fetches on
//!   change notices, debounces bursts and suppresses unchanged snapshots
//! - **Graceful degradation**: polling with backoff when the change feed
//!   drops, and stale marking when the store stops answering
//! - **Node telemetry badges**: trace, log and metric counts with an
//!   error flag
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use controltower::prelude::*;
//!
//! let store = Arc::new(InMemoryEvidenceStore::new());
//! let engine = ReconciliationEngine::builder(store.clone(), store)
//!     .config(SyncConfig::new().with_debounce_ms(25))
//!     .build()?;
//!
//! let mut handle = engine.subscribe_execution("exec-42");
//! while let Some(update) = handle.next().await {
//!     render(&update.data, update.stale);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod aggregate;
pub mod cancellation;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod store;
pub mod sync;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregate::{build_snapshot, telemetry_badge, ExecutionInputs};
    pub use crate::core::{
        ApprovalRequest, ApprovalStatus, DeploymentRecord, DeploymentStatus, EvidenceRecord,
        EvidenceStatus, Execution, ExecutionSnapshot, ExecutionStatus, SignalKind, StageDetail,
        StageId, StageState, StageStatus, StatusCode, StepCategory, TelemetryBadge,
        TelemetrySignal, Tracked,
    };
    pub use crate::errors::{ControlTowerError, StoreError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::store::{ChangeFeed, ChangeNotice, EvidenceStore, InMemoryEvidenceStore, Table};
    pub use crate::sync::{
        ReconciliationEngine, RetryConfig, SubscriptionHandle, SubscriptionState, SyncConfig,
    };
    pub use std::sync::Arc;
}
