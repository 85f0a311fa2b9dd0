//! Node telemetry badge aggregator.

use crate::core::{SignalKind, TelemetryBadge, TelemetrySignal};

/// Counts a node's signals by kind and flags any `ERROR` status code.
///
/// Signals of an unknown kind are not counted, but an `ERROR` on them
/// still raises the flag.
#[must_use]
pub fn telemetry_badge(signals: &[TelemetrySignal]) -> TelemetryBadge {
    signals
        .iter()
        .fold(TelemetryBadge::default(), |mut badge, signal| {
            match signal.kind {
                SignalKind::Trace => badge.trace_count += 1,
                SignalKind::Log => badge.log_count += 1,
                SignalKind::Metric => badge.metric_count += 1,
                SignalKind::Unknown => {}
            }
            badge.has_errors |= signal.is_error();
            badge
        })
}
