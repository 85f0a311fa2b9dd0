//! Tracing subscriber setup for binaries and examples embedding the engine.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::errors::{ControlTowerError, Result};

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Plain,
    /// One JSON object per event.
    Json,
}

/// Installs a global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Does nothing
/// if a global subscriber is already installed, whoever installed it.
pub fn init_logging(format: LogFormat) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        tracing::debug!(?format, "Global subscriber already installed");
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    match installed {
        Ok(()) => Ok(()),
        // another thread won the race to install
        Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
        Err(e) => Err(ControlTowerError::Config(format!("logging: {e}"))),
    }
}
