//! Live synchronization layer.
//!
//! This module provides:
//! - [`ReconciliationEngine`], the subscribe/unsubscribe entry point
//! - [`SubscriptionHandle`] with pull and push access to a cached value
//! - One worker task per subscribed id that keeps its value current from
//!   the change feed, falling back to polling while the feed is down
//! - [`SyncConfig`] timing knobs and the degraded-mode retry backoff

mod backoff;
mod cache;
mod config;
mod engine;
mod projection;
mod state;
mod worker;
#[cfg(test)]
mod sync_tests;

pub use backoff::{Backoff, BackoffStrategy, JitterStrategy, RetryConfig};
pub use cache::SubscriptionHandle;
pub use config::SyncConfig;
pub use engine::{EngineBuilder, ReconciliationEngine};
pub use projection::{ExecutionProjection, Projection, TelemetryProjection};
pub use state::{ScopeKind, SubscriptionState};
