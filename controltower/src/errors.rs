//! Error types for the reconciliation engine.
//!
//! Store and feed failures are contained inside the synchronization layer;
//! consumers only ever see snapshots. These types exist for collaborator
//! implementations, configuration loading and internal bookkeeping.

use std::time::Duration;
use thiserror::Error;

use crate::store::Table;

/// The main error type for engine operations.
#[derive(Debug, Error)]
pub enum ControlTowerError {
    /// The evidence store or change feed failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by evidence store and change feed implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("Evidence store unavailable: {0}")]
    Unavailable(String),

    /// A lookup named a row that does not exist.
    #[error("No {table} rows for {id}")]
    NotFound {
        /// Table that was queried.
        table: Table,
        /// Execution or node id.
        id: String,
    },

    /// Opening a change-notification stream failed.
    #[error("Change feed subscription failed: {0}")]
    Subscription(String),

    /// A fetch did not complete in time.
    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Returns true if retrying the same call later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotFound { .. })
    }
}

/// Result alias for engine operations.
pub type Result<T, E = ControlTowerError> = std::result::Result<T, E>;
