//! Content fingerprinting: streaming SHA-256 over file bytes.
//!
//! The digest is the unit of identity for duplicate comparison. Hashing is
//! stateless and referentially transparent: the same byte stream always
//! yields the same 64-char lowercase hex digest, regardless of the file's
//! name or locator. Null-hash rows in the file store act as the
//! "not-yet-computed" cache, so no separate memoization layer exists.
//!
//! Per-file read failures (missing file, revoked access, I/O error) are
//! recoverable: the candidate passes through with its hash still unset and
//! the batch continues.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::store::FileRecord;

/// Read chunk size for streaming hashes. Large enough for throughput,
/// small enough to never hold a whole file in memory.
pub const HASH_BUFFER_SIZE: usize = 8192 * 4;

/// Errors that can occur while fingerprinting a file.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The locator did not resolve to readable content.
    #[error("content not accessible: {0}")]
    NotAccessible(String),

    /// An I/O error occurred while reading the content.
    #[error("I/O error for {locator}: {source}")]
    Io {
        /// Locator where the error occurred
        locator: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Byte-stream access to a file's content by locator.
///
/// This is the seam between the fingerprinting engine and the platform:
/// the filesystem implementation treats the locator as a path, while tests
/// and other hosts can substitute their own resolution.
pub trait ContentSource: Send + Sync {
    /// Open the content behind a locator for reading, or fail with a
    /// not-accessible condition.
    fn open(&self, locator: &str) -> Result<Box<dyn Read>, HashError>;
}

/// [`ContentSource`] that interprets locators as filesystem paths.
#[derive(Debug, Default)]
pub struct FsContentSource;

impl ContentSource for FsContentSource {
    fn open(&self, locator: &str) -> Result<Box<dyn Read>, HashError> {
        let path = Path::new(locator);
        match File::open(path) {
            Ok(f) => Ok(Box::new(f)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(HashError::NotAccessible(locator.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(HashError::NotAccessible(locator.to_string()))
            }
            Err(e) => Err(HashError::Io {
                locator: locator.to_string(),
                source: e,
            }),
        }
    }
}

/// Streaming SHA-256 fingerprinter.
pub struct Fingerprinter<S> {
    source: S,
}

impl<S: ContentSource> Fingerprinter<S> {
    /// Create a fingerprinter over the given content source.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Compute the SHA-256 digest of the content behind a locator.
    ///
    /// Reads in [`HASH_BUFFER_SIZE`] chunks; the whole file is never held
    /// in memory.
    pub fn digest(&self, locator: &str) -> Result<String, HashError> {
        let mut reader = self.source.open(locator)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; HASH_BUFFER_SIZE];

        loop {
            let n = reader.read(&mut buf).map_err(|e| HashError::Io {
                locator: locator.to_string(),
                source: e,
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(to_hex(&hasher.finalize()))
    }

    /// Fingerprint a candidate record.
    ///
    /// On success the record comes back with `content_hash` populated; on
    /// any read failure the record is returned unchanged and the error is
    /// logged. This is a recoverable per-file failure, never fatal to the
    /// batch.
    #[must_use]
    pub fn hash_candidate(&self, mut record: FileRecord) -> FileRecord {
        match self.digest(&record.locator) {
            Ok(hash) => {
                log::trace!("Hashed {}: {}", record.locator, hash);
                record.content_hash = Some(hash);
            }
            Err(e) => {
                log::warn!("Failed to hash {}: {}", record.locator, e);
            }
        }
        record
    }
}

/// Render a digest as lowercase hex.
fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// Whether a string has the shape of a SHA-256 digest: exactly 64
/// lowercase hex characters.
#[must_use]
pub fn is_valid_sha256(hash: &str) -> bool {
    hash.len() == 64
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MediaType;
    use std::fs;
    use tempfile::TempDir;

    fn make_record(locator: &str, size: u64) -> FileRecord {
        FileRecord::new(
            locator.to_string(),
            locator.to_string(),
            None,
            None,
            None,
            size,
            0,
            MediaType::Other,
        )
    }

    #[test]
    fn test_digest_known_vector() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.txt");
        fs::write(&path, b"abc").unwrap();

        let fp = Fingerprinter::new(FsContentSource);
        let hash = fp.digest(path.to_str().unwrap()).unwrap();

        // SHA-256("abc")
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_deterministic_across_locators() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("sub").join("b.bin");
        fs::create_dir_all(b.parent().unwrap()).unwrap();
        fs::write(&a, b"same content").unwrap();
        fs::write(&b, b"same content").unwrap();

        let fp = Fingerprinter::new(FsContentSource);
        let ha = fp.digest(a.to_str().unwrap()).unwrap();
        let hb = fp.digest(b.to_str().unwrap()).unwrap();

        assert_eq!(ha, hb);
        assert!(is_valid_sha256(&ha));
    }

    #[test]
    fn test_digest_streams_large_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        // Spans multiple read chunks
        fs::write(&path, vec![0x5au8; HASH_BUFFER_SIZE * 3 + 17]).unwrap();

        let fp = Fingerprinter::new(FsContentSource);
        let h1 = fp.digest(path.to_str().unwrap()).unwrap();
        let h2 = fp.digest(path.to_str().unwrap()).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_hash_candidate_failure_passes_through_unchanged() {
        let fp = Fingerprinter::new(FsContentSource);
        let record = make_record("/definitely/missing/file.bin", 4096);
        let out = fp.hash_candidate(record.clone());

        assert!(out.content_hash.is_none());
        assert_eq!(out.id, record.id);
        assert_eq!(out.size, record.size);
    }

    #[test]
    fn test_hash_candidate_populates_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.dat");
        fs::write(&path, b"hello").unwrap();

        let fp = Fingerprinter::new(FsContentSource);
        let out = fp.hash_candidate(make_record(path.to_str().unwrap(), 5));

        let hash = out.content_hash.expect("hash should be set");
        assert!(is_valid_sha256(&hash));
    }

    #[test]
    fn test_is_valid_sha256() {
        assert!(is_valid_sha256(&"0".repeat(64)));
        assert!(is_valid_sha256(&"f".repeat(64)));
        assert!(!is_valid_sha256(&"F".repeat(64))); // uppercase rejected
        assert!(!is_valid_sha256(&"0".repeat(63)));
        assert!(!is_valid_sha256(&"0".repeat(65)));
        assert!(!is_valid_sha256(""));
        assert!(!is_valid_sha256(&"g".repeat(64)));
    }

    #[test]
    fn test_open_missing_is_not_accessible() {
        let err = FsContentSource
            .open("/no/such/path")
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, HashError::NotAccessible(_)));
    }
}
