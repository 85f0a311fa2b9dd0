//! Evidence store collaborator.
//!
//! The engine never writes to the store. It reads rows through
//! [`EvidenceStore`] and learns about changes through [`ChangeFeed`].

mod memory;
mod ports;

pub use memory::InMemoryEvidenceStore;
pub use ports::{ChangeFeed, ChangeNotice, ChangeStream, EvidenceStore, Table};

#[cfg(test)]
pub use ports::MockEvidenceStore;
