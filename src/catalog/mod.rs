//! Media catalog access and file indexing.
//!
//! This module provides:
//! - [`MediaCatalog`]: the platform media-catalog collaborator, queried one
//!   category at a time and returning plain metadata rows.
//! - [`indexer`]: turns catalog rows into unhashed [`FileRecord`]
//!   candidates, deriving each file's media type and dropping sub-threshold
//!   noise.
//! - [`fs`]: a filesystem-backed catalog used by the CLI and tests.
//!
//! The core depends only on the row shape `(id, display_name, mime_type,
//! size, bucket, date_modified)`, not on any specific query mechanism.

pub mod fs;
pub mod indexer;

pub use fs::FsCatalog;
pub use indexer::{EnumerationStats, Indexer, MIN_INDEXED_SIZE};

/// The four media categories, enumerated in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaCategory {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaCategory {
    /// All categories in enumeration order.
    pub const ALL: [MediaCategory; 4] = [
        MediaCategory::Image,
        MediaCategory::Video,
        MediaCategory::Audio,
        MediaCategory::Document,
    ];

    /// Human-readable name for logs and progress output.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Video => "videos",
            Self::Audio => "audio",
            Self::Document => "documents",
        }
    }
}

/// One row returned by a media catalog query.
#[derive(Debug, Clone)]
pub struct CatalogRow {
    /// Catalog-assigned identifier, stable within a device.
    pub id: String,
    /// Opaque content locator (platform URI or path).
    pub locator: String,
    pub display_name: Option<String>,
    pub mime_type: Option<String>,
    /// Byte length.
    pub size: u64,
    /// Containing folder or album.
    pub bucket: Option<String>,
    /// Last-modified timestamp, epoch milliseconds.
    pub date_modified: i64,
}

/// Errors that can occur while querying a media catalog.
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    /// The category is not supported on this host.
    #[error("category {0} not supported by this catalog")]
    Unsupported(&'static str),

    /// Access to the catalog was denied.
    #[error("catalog access denied: {0}")]
    AccessDenied(String),

    /// An I/O error occurred during the query.
    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Query interface over the platform media catalog.
///
/// Read-only and idempotent: querying the same unchanged catalog twice
/// yields the same rows.
pub trait MediaCatalog {
    /// Return all rows for one media category.
    fn query(&self, category: MediaCategory) -> Result<Vec<CatalogRow>, CatalogError>;
}
