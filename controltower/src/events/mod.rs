//! Lifecycle events of the synchronization layer.
//!
//! Workers report state transitions, publishes, fetch failures and
//! closure to an [`EventSink`] supplied when the engine is built.

mod event;
mod sink;

pub use event::{SyncEvent, SyncEventKind};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
