//! Filesystem-backed media catalog.
//!
//! Maps one root directory per media category onto catalog rows, guessing
//! MIME types from file extensions. This is the concrete [`MediaCatalog`]
//! the CLI uses; on a mobile host the platform media index plays this role
//! instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use super::{CatalogError, CatalogRow, MediaCatalog, MediaCategory};

/// Media catalog over plain directories, one root per category.
///
/// Categories without a configured root report
/// [`CatalogError::Unsupported`], mirroring platforms where a generic
/// document query is unavailable.
#[derive(Debug, Default)]
pub struct FsCatalog {
    roots: HashMap<&'static str, PathBuf>,
}

impl FsCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the root directory for one category.
    #[must_use]
    pub fn with_root(mut self, category: MediaCategory, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(category.name(), root.into());
        self
    }

    /// Use a single root for all four categories.
    ///
    /// Category membership is then decided per file by its guessed MIME
    /// type, so every file shows up under exactly one category.
    #[must_use]
    pub fn single_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut catalog = Self::new();
        for category in MediaCategory::ALL {
            catalog.roots.insert(category.name(), root.clone());
        }
        catalog
    }

    fn walk_root(
        &self,
        root: &Path,
        category: MediaCategory,
    ) -> Result<Vec<CatalogRow>, CatalogError> {
        if !root.exists() {
            return Err(CatalogError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("catalog root not found: {}", root.display()),
            )));
        }

        // When several categories share a root, each file must land in
        // exactly one category's result set.
        let shared_root = MediaCategory::ALL
            .iter()
            .filter(|c| self.roots.get(c.name()) == Some(&root.to_path_buf()))
            .count()
            > 1;

        let mut rows = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let display_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            let mime_type = guess_mime(path);

            if shared_root && category_for_mime(mime_type.as_deref()) != category {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Failed to stat {}: {}", path.display(), e);
                    continue;
                }
            };
            let date_modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_millis() as i64);

            rows.push(CatalogRow {
                id: path.to_string_lossy().into_owned(),
                locator: path.to_string_lossy().into_owned(),
                display_name,
                mime_type,
                size: metadata.len(),
                bucket: path
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned()),
                date_modified,
            });
        }

        // Stable order so repeated enumeration yields the same sequence.
        rows.sort_by(|a, b| a.locator.cmp(&b.locator));
        Ok(rows)
    }
}

impl MediaCatalog for FsCatalog {
    fn query(&self, category: MediaCategory) -> Result<Vec<CatalogRow>, CatalogError> {
        let root = self
            .roots
            .get(category.name())
            .ok_or(CatalogError::Unsupported(category.name()))?;
        self.walk_root(root, category)
    }
}

/// Which category a MIME type belongs to when categories share a root.
fn category_for_mime(mime: Option<&str>) -> MediaCategory {
    match mime {
        Some(m) if m.starts_with("image/") => MediaCategory::Image,
        Some(m) if m.starts_with("video/") => MediaCategory::Video,
        Some(m) if m.starts_with("audio/") => MediaCategory::Audio,
        _ => MediaCategory::Document,
    }
}

/// Guess a MIME type from the file extension.
fn guess_mime(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "bmp" => "image/bmp",
        "mp4" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "apk" => "application/vnd.android.package-archive",
        "doc" | "docx" => "application/msword",
        "txt" | "log" | "md" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        _ => return None,
    };
    Some(mime.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_unconfigured_category_is_unsupported() {
        let catalog = FsCatalog::new();
        let err = catalog.query(MediaCategory::Document).unwrap_err();
        assert!(matches!(err, CatalogError::Unsupported("documents")));
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let catalog = FsCatalog::new().with_root(MediaCategory::Image, "/no/such/root");
        let err = catalog.query(MediaCategory::Image).unwrap_err();
        assert!(matches!(err, CatalogError::Io(_)));
    }

    #[test]
    fn test_rows_carry_metadata() {
        let dir = TempDir::new().unwrap();
        let album = dir.path().join("Camera");
        fs::create_dir(&album).unwrap();
        fs::write(album.join("photo.jpg"), vec![0u8; 2048]).unwrap();

        let catalog = FsCatalog::new().with_root(MediaCategory::Image, dir.path());
        let rows = catalog.query(MediaCategory::Image).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.display_name.as_deref(), Some("photo.jpg"));
        assert_eq!(row.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(row.size, 2048);
        assert_eq!(row.bucket.as_deref(), Some("Camera"));
        assert!(row.date_modified > 0);
    }

    #[test]
    fn test_single_root_partitions_by_mime() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join("b.mp3"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join("c.pdf"), vec![0u8; 10]).unwrap();

        let catalog = FsCatalog::single_root(dir.path());

        let images = catalog.query(MediaCategory::Image).unwrap();
        let audio = catalog.query(MediaCategory::Audio).unwrap();
        let docs = catalog.query(MediaCategory::Document).unwrap();
        let videos = catalog.query(MediaCategory::Video).unwrap();

        assert_eq!(images.len(), 1);
        assert_eq!(audio.len(), 1);
        assert_eq!(docs.len(), 1);
        assert!(videos.is_empty());
    }

    #[test]
    fn test_query_order_is_stable() {
        let dir = TempDir::new().unwrap();
        for name in ["z.png", "a.png", "m.png"] {
            fs::write(dir.path().join(name), vec![0u8; 10]).unwrap();
        }

        let catalog = FsCatalog::new().with_root(MediaCategory::Image, dir.path());
        let first = catalog.query(MediaCategory::Image).unwrap();
        let second = catalog.query(MediaCategory::Image).unwrap();

        let locators: Vec<_> = first.iter().map(|r| r.locator.clone()).collect();
        assert_eq!(
            locators,
            second.iter().map(|r| r.locator.clone()).collect::<Vec<_>>()
        );
        let mut sorted = locators.clone();
        sorted.sort();
        assert_eq!(locators, sorted);
    }
}
