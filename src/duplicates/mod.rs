//! Duplicate group derivation from the file store.
//!
//! Groups are ephemeral: derived from store state on every call, never
//! persisted or cached. A group exists only while at least two active
//! records share its content hash.

pub mod grouper;
pub mod groups;

pub use grouper::Grouper;
pub use groups::DuplicateGroup;
