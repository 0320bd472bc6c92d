//! Persistent file store: the single source of truth for discovered files.
//!
//! # Architecture
//!
//! The store is split into two main components:
//!
//! * [`database`]: SQLite connection management, pragmas, schema migration,
//!   and change notification.
//! * [`queries`]: CRUD and derived-query operations over [`FileRecord`] and
//!   [`ScanSessionRecord`].
//!
//! All other components (indexer, fingerprinter, grouper, orchestrator,
//! stats, sync) read and write through this contract and never hold a
//! private copy of record state as source of truth.
//!
//! # Derived fields
//!
//! `is_duplicate` and `group_hash` are derived: a record is a duplicate iff
//! at least two non-deleted records share its non-null `content_hash`. The
//! scan pipeline recomputes them via
//! [`FileStore::recompute_duplicate_flags`] after every persist; nothing
//! else may mutate them.

pub mod database;
pub mod queries;

pub use database::{ChangeListener, FileStore};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::fingerprint::is_valid_sha256;

/// Classification of a file derived once from its MIME type and name.
///
/// Immutable after record creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Document,
    Apk,
    Other,
}

impl MediaType {
    /// Stable string form used in the database and JSON output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::Audio => "AUDIO",
            Self::Document => "DOCUMENT",
            Self::Apk => "APK",
            Self::Other => "OTHER",
        }
    }

    /// Parse the stable string form. Unknown values map to `Other`.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "IMAGE" => Self::Image,
            "VIDEO" => Self::Video,
            "AUDIO" => Self::Audio,
            "DOCUMENT" => Self::Document,
            "APK" => Self::Apk,
            _ => Self::Other,
        }
    }
}

/// One entry per discovered file.
///
/// Created by the media indexer with `content_hash = None`, filled in by
/// the fingerprinting engine, and persisted through [`FileStore::upsert`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Stable identifier, unique, never reused.
    pub id: String,
    /// Opaque reference to the file content (platform URI or path).
    /// Not guaranteed stable across devices.
    pub locator: String,
    /// Display name, if the catalog reported one.
    pub display_name: Option<String>,
    /// MIME type, if the catalog reported one.
    pub mime_type: Option<String>,
    /// Containing folder or album.
    pub bucket: Option<String>,
    /// Byte length.
    pub size: u64,
    /// Last-modified timestamp, epoch milliseconds.
    pub date_modified: i64,
    /// 64-char lowercase hex SHA-256 digest; `None` until computed.
    /// A null hash doubles as "fingerprinting not yet done".
    pub content_hash: Option<String>,
    /// Derived once at creation; immutable thereafter.
    pub media_type: MediaType,
    /// Derived: true iff another active record shares `content_hash`.
    pub is_duplicate: bool,
    /// The shared `content_hash` when `is_duplicate`, else `None`.
    pub group_hash: Option<String>,
    /// Soft-delete flag; deleted records are excluded from all read
    /// queries but retained until purged.
    pub is_deleted: bool,
    /// Record creation timestamp, epoch milliseconds. Immutable.
    pub created_at: i64,
}

impl FileRecord {
    /// Create a new unhashed record as the media indexer produces it.
    #[must_use]
    pub fn new(
        id: String,
        locator: String,
        display_name: Option<String>,
        mime_type: Option<String>,
        bucket: Option<String>,
        size: u64,
        date_modified: i64,
        media_type: MediaType,
    ) -> Self {
        Self {
            id,
            locator,
            display_name,
            mime_type,
            bucket,
            size,
            date_modified,
            content_hash: None,
            media_type,
            is_duplicate: false,
            group_hash: None,
            is_deleted: false,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// Whether the record's hash, if present, has the valid 64-hex shape.
    #[must_use]
    pub fn has_valid_hash(&self) -> bool {
        match &self.content_hash {
            Some(h) => is_valid_sha256(h),
            None => true,
        }
    }
}

/// One record per completed or in-progress scan.
///
/// Created when a scan starts and mutated only by the scan orchestrator;
/// never mutated after `finished_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSessionRecord {
    pub id: String,
    /// Epoch milliseconds.
    pub started_at: i64,
    /// `None` while the scan is running.
    pub finished_at: Option<i64>,
    pub files_scanned: u64,
    pub bytes_scanned: u64,
    pub duplicates_found: u64,
    pub bytes_potentially_saved: u64,
    /// Set when the scan terminated in the failed state. Distinguishes
    /// "scan failed" from "scan succeeded, found nothing".
    pub error: Option<String>,
}

/// Summary row from the single-pass duplicate grouping query:
/// `GROUP BY content_hash HAVING COUNT(*) > 1` over active hashed records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroupSummary {
    pub content_hash: String,
    pub count: u64,
    pub total_size: u64,
}

/// Errors from the file store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The underlying SQLite database failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A record carried a malformed content hash.
    #[error("invalid content hash for record {id}: {hash:?}")]
    InvalidHash { id: String, hash: String },

    /// The store file location could not be prepared.
    #[error("store path error: {0}")]
    Path(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
