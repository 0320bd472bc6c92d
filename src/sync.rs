//! Metadata sync: pushes fingerprint metadata to a remote endpoint.
//!
//! The sync job is read-only against the file store and strictly
//! best-effort. It never blocks or fails a scan; scheduling, retry, and
//! backoff policy belong to the host that invokes [`SyncJob::run`].

use serde::{Deserialize, Serialize};

use crate::store::{FileRecord, FileStore, StoreError};

/// Metadata payload for one hashed file.
///
/// Only derived metadata leaves the device; no file content and no full
/// locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadataDto {
    /// 64-hex lowercase SHA-256 digest.
    pub sha256: String,
    /// Byte length.
    pub size: u64,
    /// MIME type, if known.
    pub mime: Option<String>,
    /// Final locator segment (display-oriented, not resolvable).
    pub path_tail: String,
}

impl FileMetadataDto {
    /// Build the payload for a hashed record. Returns `None` for records
    /// still awaiting a hash; those are not sync candidates.
    #[must_use]
    pub fn from_record(record: &FileRecord) -> Option<Self> {
        let sha256 = record.content_hash.clone()?;
        Some(Self {
            sha256,
            size: record.size,
            mime: record.mime_type.clone(),
            path_tail: path_tail(&record.locator),
        })
    }
}

fn path_tail(locator: &str) -> String {
    locator
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(locator)
        .to_string()
}

/// Errors from a sync run.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    /// Reading candidates from the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The remote endpoint rejected or dropped the batch.
    #[error("endpoint error: {0}")]
    Endpoint(String),
}

/// Remote side of the sync job. The transport (HTTP client, queue, test
/// double) lives behind this seam.
pub trait MetadataEndpoint {
    /// Deliver one batch of metadata. An error fails this run only; the
    /// host may retry the whole job later.
    fn upload(&self, batch: &[FileMetadataDto]) -> Result<(), SyncError>;
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Hashed records uploaded.
    pub uploaded: usize,
    /// Records skipped because no hash was available yet.
    pub skipped_unhashed: usize,
}

/// One-shot metadata sync over all active hashed records.
pub struct SyncJob<'a, E> {
    store: &'a FileStore,
    endpoint: &'a E,
    batch_size: usize,
}

impl<'a, E: MetadataEndpoint> SyncJob<'a, E> {
    #[must_use]
    pub fn new(store: &'a FileStore, endpoint: &'a E) -> Self {
        Self {
            store,
            endpoint,
            batch_size: 100,
        }
    }

    /// Records per upload call.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run one sync pass. Reads the store, uploads hashed records in
    /// batches, and reports what was skipped. Mutates nothing locally.
    pub fn run(&self) -> Result<SyncReport, SyncError> {
        let files = self.store.active_files()?;
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut uploaded = 0;
        let mut skipped_unhashed = 0;

        for record in &files {
            match FileMetadataDto::from_record(record) {
                Some(dto) => batch.push(dto),
                None => skipped_unhashed += 1,
            }
            if batch.len() >= self.batch_size {
                self.endpoint.upload(&batch)?;
                uploaded += batch.len();
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.endpoint.upload(&batch)?;
            uploaded += batch.len();
        }

        log::info!(
            "Sync complete: {} uploaded, {} skipped (unhashed)",
            uploaded,
            skipped_unhashed
        );
        Ok(SyncReport {
            uploaded,
            skipped_unhashed,
        })
    }
}
