//! Storage statistics derived from the file store.
//!
//! Pure reads: every figure is computed from current store state on each
//! call, so two snapshots taken around a store mutation differ exactly by
//! that mutation.

use serde::Serialize;

use crate::store::{FileStore, MediaType, StoreResult};

/// Default size floor for the "large file" bucket: 50 MiB.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Size above which a file counts as large for its media type.
///
/// Video gets a much higher floor than images; an unremarkable video
/// easily dwarfs a very large photo.
#[must_use]
pub fn large_threshold_for(media_type: MediaType) -> u64 {
    const MIB: u64 = 1024 * 1024;
    match media_type {
        MediaType::Image => 10 * MIB,
        MediaType::Video => 100 * MIB,
        MediaType::Audio => 50 * MIB,
        MediaType::Document => 20 * MIB,
        MediaType::Apk => 50 * MIB,
        MediaType::Other => 10 * MIB,
    }
}

/// One consistent snapshot of storage statistics.
///
/// All sizes in bytes. Soft-deleted records are excluded from every
/// figure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Active records.
    pub total_files: u64,
    /// Total size of active records.
    pub total_size: u64,
    /// Active records flagged as duplicates.
    pub duplicate_files: u64,
    /// Total size of duplicate-flagged records.
    pub duplicate_size: u64,
    /// Active records at or above the large-file threshold.
    pub large_files: u64,
    /// Total size of large records.
    pub large_files_size: u64,
    /// Bytes reclaimable by keeping one copy per duplicate group.
    pub potential_savings: u64,
}

/// Computes [`StorageStats`] snapshots from the file store.
pub struct StatsAggregator<'a> {
    store: &'a FileStore,
    large_file_threshold: u64,
}

impl<'a> StatsAggregator<'a> {
    #[must_use]
    pub fn new(store: &'a FileStore) -> Self {
        Self {
            store,
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
        }
    }

    /// Override the flat large-file threshold (bytes).
    #[must_use]
    pub fn with_large_file_threshold(mut self, threshold: u64) -> Self {
        self.large_file_threshold = threshold;
        self
    }

    /// Compute a statistics snapshot from current store state.
    pub fn snapshot(&self) -> StoreResult<StorageStats> {
        let (total_files, total_size) = self.store.total_files()?;
        let (duplicate_files, duplicate_size) = self.store.duplicate_files()?;
        let (large_files, large_files_size) =
            self.store.large_file_totals(self.large_file_threshold)?;
        let potential_savings = self.store.potential_savings()?;

        Ok(StorageStats {
            total_files,
            total_size,
            duplicate_files,
            duplicate_size,
            large_files,
            large_files_size,
            potential_savings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileRecord;

    fn record(id: &str, size: u64, hash: Option<&str>) -> FileRecord {
        let mut r = FileRecord::new(
            id.to_string(),
            format!("/f/{id}"),
            None,
            None,
            None,
            size,
            1,
            MediaType::Image,
        );
        r.content_hash = hash.map(String::from);
        r
    }

    #[test]
    fn test_empty_store_is_all_zero() {
        let store = FileStore::open_in_memory().unwrap();
        let stats = StatsAggregator::new(&store).snapshot().unwrap();
        assert_eq!(stats, StorageStats::default());
    }

    #[test]
    fn test_snapshot_counts_and_savings() {
        let store = FileStore::open_in_memory().unwrap();
        let h = "a".repeat(64);
        store
            .upsert(&[
                record("a", 1024, Some(&h)),
                record("b", 1024, Some(&h)),
                record("c", 4096, None),
            ])
            .unwrap();
        store.recompute_duplicate_flags().unwrap();

        let stats = StatsAggregator::new(&store)
            .with_large_file_threshold(2048)
            .snapshot()
            .unwrap();
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.total_size, 1024 + 1024 + 4096);
        assert_eq!(stats.duplicate_files, 2);
        assert_eq!(stats.duplicate_size, 2048);
        assert_eq!(stats.large_files, 1);
        assert_eq!(stats.large_files_size, 4096);
        assert_eq!(stats.potential_savings, 1024);
    }

    #[test]
    fn test_snapshot_reflects_deletions() {
        let store = FileStore::open_in_memory().unwrap();
        let h = "b".repeat(64);
        store
            .upsert(&[record("a", 100, Some(&h)), record("b", 100, Some(&h))])
            .unwrap();
        store.recompute_duplicate_flags().unwrap();

        let before = StatsAggregator::new(&store).snapshot().unwrap();
        assert_eq!(before.duplicate_files, 2);

        store.mark_deleted(&["b".to_string()]).unwrap();
        store.recompute_duplicate_flags().unwrap();

        let after = StatsAggregator::new(&store).snapshot().unwrap();
        assert_eq!(after.total_files, 1);
        assert_eq!(after.duplicate_files, 0);
        assert_eq!(after.potential_savings, 0);
    }

    #[test]
    fn test_per_type_thresholds() {
        assert!(large_threshold_for(MediaType::Video) > large_threshold_for(MediaType::Image));
        assert_eq!(
            large_threshold_for(MediaType::Audio),
            DEFAULT_LARGE_FILE_THRESHOLD
        );
    }
}
