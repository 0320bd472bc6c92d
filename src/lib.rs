//! purescan - Storage Cleanup Scanner
//!
//! Indexes media files from a catalog, fingerprints them with streaming
//! SHA-256, persists records in a SQLite file store, and derives duplicate
//! groups and storage statistics from the persisted state.
//!
//! # Architecture
//!
//! - [`catalog`]: media catalog access and candidate indexing
//! - [`fingerprint`]: streaming SHA-256 content hashing
//! - [`store`]: the persistent file store, single source of truth
//! - [`duplicates`]: duplicate group derivation
//! - [`scan`]: the scan orchestrator tying the pipeline together
//! - [`stats`]: storage statistics snapshots
//! - [`sync`]: metadata sync to a remote endpoint

pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod progress;
pub mod scan;
pub mod stats;
pub mod store;
pub mod sync;

pub use app::run_app;
