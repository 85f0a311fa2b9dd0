//! Subscription lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one subscribed execution or node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// First fetch in progress; nothing published yet.
    Initializing,
    /// Change feed open; recomputes are notice-driven.
    Live,
    /// Feed unavailable or fetches failing; polling on an interval.
    Degraded,
    /// Last subscriber left; nothing more will be published.
    Closed,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Live => write!(f, "live"),
            Self::Degraded => write!(f, "degraded"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// What a subscription id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// A pipeline execution.
    Execution,
    /// A deployable node.
    Node,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execution => write!(f, "execution"),
            Self::Node => write!(f, "node"),
        }
    }
}
