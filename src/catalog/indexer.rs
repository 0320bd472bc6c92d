//! Media indexer: catalog rows in, unhashed file records out.
//!
//! Enumerates the four media categories in sequence, derives each
//! candidate's [`MediaType`] from its MIME type and filename, and filters
//! out sub-threshold files. A failure in one category is logged and skipped;
//! only all four failing is fatal.
//!
//! The indexer never touches the file store and has no side effects beyond
//! reading the catalog, so re-running it over an unchanged device yields
//! the same candidate set.

use crate::store::{FileRecord, MediaType};

use super::{CatalogError, CatalogRow, MediaCatalog, MediaCategory};

/// Files smaller than this are treated as thumbnails or system noise and
/// excluded from indexing entirely. Fixed policy constant.
pub const MIN_INDEXED_SIZE: u64 = 1024;

/// Statistics from one enumeration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumerationStats {
    /// Rows returned by the catalog across all categories.
    pub rows_seen: usize,
    /// Rows dropped by the minimum-size filter.
    pub below_min_size: usize,
    /// Candidates produced.
    pub candidates: usize,
    /// Categories that failed to enumerate and were skipped.
    pub failed_categories: Vec<&'static str>,
}

/// Turns media catalog rows into unhashed [`FileRecord`] candidates.
pub struct Indexer<'a, C> {
    catalog: &'a C,
}

impl<'a, C: MediaCatalog> Indexer<'a, C> {
    #[must_use]
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    /// Enumerate all categories and produce candidate records.
    ///
    /// Per-category failures are logged and skipped. If every category
    /// fails, the last error is returned: the caller must be able to tell
    /// "enumeration impossible" apart from "device has no media".
    pub fn enumerate(&self) -> Result<(Vec<FileRecord>, EnumerationStats), CatalogError> {
        let mut candidates = Vec::new();
        let mut stats = EnumerationStats::default();
        let mut last_error: Option<CatalogError> = None;
        let mut any_succeeded = false;

        for category in MediaCategory::ALL {
            match self.catalog.query(category) {
                Ok(rows) => {
                    any_succeeded = true;
                    log::debug!("Enumerated {} rows in {}", rows.len(), category.name());
                    for row in rows {
                        stats.rows_seen += 1;
                        if row.size < MIN_INDEXED_SIZE {
                            stats.below_min_size += 1;
                            log::trace!(
                                "Skipping {} ({} bytes, below threshold)",
                                row.locator,
                                row.size
                            );
                            continue;
                        }
                        candidates.push(candidate_from_row(row));
                    }
                }
                Err(e) => {
                    log::warn!("Failed to enumerate {}: {}", category.name(), e);
                    stats.failed_categories.push(category.name());
                    last_error = Some(e);
                }
            }
        }

        if !any_succeeded {
            // Enumeration permission entirely revoked, or no catalog at all.
            return Err(last_error.unwrap_or(CatalogError::AccessDenied(
                "no media category could be enumerated".to_string(),
            )));
        }

        stats.candidates = candidates.len();
        log::info!(
            "Enumeration complete: {} rows, {} candidates ({} below {} bytes, {} categories failed)",
            stats.rows_seen,
            stats.candidates,
            stats.below_min_size,
            MIN_INDEXED_SIZE,
            stats.failed_categories.len()
        );

        Ok((candidates, stats))
    }
}

/// Build an unhashed candidate from a catalog row.
fn candidate_from_row(row: CatalogRow) -> FileRecord {
    let media_type = detect_media_type(row.mime_type.as_deref(), row.display_name.as_deref());
    FileRecord::new(
        row.id,
        row.locator,
        row.display_name,
        row.mime_type,
        row.bucket,
        row.size,
        row.date_modified,
        media_type,
    )
}

/// Derive a media type from MIME-type prefix and filename extension.
///
/// `application/*` normally maps to Document, except `.apk` packages; a
/// bare `.apk` name with no usable MIME type is also an APK.
#[must_use]
pub fn detect_media_type(mime_type: Option<&str>, display_name: Option<&str>) -> MediaType {
    let is_apk = display_name.is_some_and(|n| n.to_ascii_lowercase().ends_with(".apk"));

    match mime_type {
        Some(m) if m.starts_with("image/") => MediaType::Image,
        Some(m) if m.starts_with("video/") => MediaType::Video,
        Some(m) if m.starts_with("audio/") => MediaType::Audio,
        Some(m) if m.starts_with("application/") => {
            if is_apk {
                MediaType::Apk
            } else {
                MediaType::Document
            }
        }
        Some(m) if m.starts_with("text/") => MediaType::Document,
        _ if is_apk => MediaType::Apk,
        _ => MediaType::Other,
    }
}
