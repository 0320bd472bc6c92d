//! End-to-end pipeline tests: scan a real directory tree into an on-disk
//! store and exercise the follow-up flows (rescan, cleanup, purge).

use std::fs;
use std::path::Path;

use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

use purescan::catalog::FsCatalog;
use purescan::duplicates::Grouper;
use purescan::fingerprint::FsContentSource;
use purescan::scan::ScanOrchestrator;
use purescan::stats::StatsAggregator;
use purescan::store::FileStore;

fn write_with_mtime(path: &Path, content: &[u8], mtime_secs: i64) {
    fs::write(path, content).unwrap();
    set_file_mtime(path, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
}

fn scan(store: &FileStore, root: &Path) -> purescan::scan::ScanOutcome {
    let catalog = FsCatalog::single_root(root);
    ScanOrchestrator::new(store, &catalog, FsContentSource)
        .run_scan()
        .unwrap()
}

#[test]
fn test_scan_persists_across_reopen() {
    let media = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let db_path = data.path().join("store.db");

    write_with_mtime(&media.path().join("a.jpg"), &[1u8; 2048], 1_000);
    write_with_mtime(&media.path().join("b.jpg"), &[1u8; 2048], 2_000);
    write_with_mtime(&media.path().join("c.mp4"), &[2u8; 8192], 3_000);

    {
        let store = FileStore::open(&db_path).unwrap();
        let outcome = scan(&store, media.path());
        assert_eq!(outcome.session.files_scanned, 3);
        assert_eq!(outcome.groups.len(), 1);
    }

    // Reopen: records, flags, and the session survive.
    let store = FileStore::open(&db_path).unwrap();
    let files = store.active_files().unwrap();
    assert_eq!(files.len(), 3);
    assert_eq!(files.iter().filter(|f| f.is_duplicate).count(), 2);

    let groups = Grouper::new(&store).groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].count(), 2);

    let session = store.last_session().unwrap().unwrap();
    assert!(session.finished_at.is_some());
    assert_eq!(session.duplicates_found, 1);
}

#[test]
fn test_oldest_file_is_the_kept_copy() {
    let media = TempDir::new().unwrap();
    let store = FileStore::open_in_memory().unwrap();

    // Same content, distinct modification times; newest written first so
    // the ordering cannot come from enumeration order.
    write_with_mtime(&media.path().join("newest.jpg"), &[7u8; 4096], 9_000);
    write_with_mtime(&media.path().join("oldest.jpg"), &[7u8; 4096], 1_000);
    write_with_mtime(&media.path().join("middle.jpg"), &[7u8; 4096], 5_000);

    let outcome = scan(&store, media.path());
    assert_eq!(outcome.groups.len(), 1);

    let group = &outcome.groups[0];
    let names: Vec<_> = group
        .files
        .iter()
        .map(|f| f.display_name.clone().unwrap())
        .collect();
    assert_eq!(names, vec!["oldest.jpg", "middle.jpg", "newest.jpg"]);
    assert_eq!(group.potential_savings(), 2 * 4096);
}

#[test]
fn test_small_files_are_not_indexed() {
    let media = TempDir::new().unwrap();
    let store = FileStore::open_in_memory().unwrap();

    write_with_mtime(&media.path().join("tiny.jpg"), &[1u8; 512], 1_000);
    write_with_mtime(&media.path().join("tiny2.jpg"), &[1u8; 512], 2_000);
    write_with_mtime(&media.path().join("real.jpg"), &[1u8; 2048], 3_000);

    let outcome = scan(&store, media.path());

    // The two identical 512-byte thumbnails fall below the floor and never
    // become a duplicate group.
    assert_eq!(outcome.session.files_scanned, 1);
    assert!(outcome.groups.is_empty());
}

#[test]
fn test_rescan_after_content_change_regroups() {
    let media = TempDir::new().unwrap();
    let store = FileStore::open_in_memory().unwrap();

    let a = media.path().join("a.jpg");
    let b = media.path().join("b.jpg");
    write_with_mtime(&a, &[1u8; 2048], 1_000);
    write_with_mtime(&b, &[1u8; 2048], 2_000);

    let outcome = scan(&store, media.path());
    assert_eq!(outcome.groups.len(), 1);

    // One copy is edited; the pair no longer duplicates.
    write_with_mtime(&b, &[9u8; 2048], 3_000);
    let outcome = scan(&store, media.path());
    assert!(outcome.groups.is_empty());

    let files = store.active_files().unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| !f.is_duplicate));
}

#[test]
fn test_cleanup_and_purge_flow() {
    let media = TempDir::new().unwrap();
    let store = FileStore::open_in_memory().unwrap();

    write_with_mtime(&media.path().join("keep.jpg"), &[3u8; 2048], 1_000);
    write_with_mtime(&media.path().join("dup.jpg"), &[3u8; 2048], 2_000);

    let outcome = scan(&store, media.path());
    let group = &outcome.groups[0];

    // Soft-delete everything but the oldest copy.
    let doomed: Vec<String> = group.files.iter().skip(1).map(|f| f.id.clone()).collect();
    store.mark_deleted(&doomed).unwrap();
    store.recompute_duplicate_flags().unwrap();

    let stats = StatsAggregator::new(&store).snapshot().unwrap();
    assert_eq!(stats.total_files, 1);
    assert_eq!(stats.duplicate_files, 0);
    assert_eq!(stats.potential_savings, 0);
    assert!(Grouper::new(&store).groups().unwrap().is_empty());

    // Within the grace period nothing is purged; past it the row goes.
    assert_eq!(store.purge_deleted_before(0).unwrap(), 0);
    let purged = store
        .purge_deleted_before(chrono::Utc::now().timestamp_millis() + 1)
        .unwrap();
    assert_eq!(purged, 1);
}

#[test]
fn test_change_listener_fires_on_scan() {
    let media = TempDir::new().unwrap();
    let store = FileStore::open_in_memory().unwrap();
    write_with_mtime(&media.path().join("a.jpg"), &[1u8; 2048], 1_000);

    let mut listener = store.subscribe();
    assert!(!listener.changed());

    scan(&store, media.path());
    assert!(listener.changed());
    // Acknowledged: quiet again until the next mutation.
    assert!(!listener.changed());
}

#[test]
fn test_duplicate_detection_spans_scans() {
    let media = TempDir::new().unwrap();
    let store = FileStore::open_in_memory().unwrap();

    let a = media.path().join("a.jpg");
    write_with_mtime(&a, &[5u8; 2048], 1_000);
    let outcome = scan(&store, media.path());
    assert!(outcome.groups.is_empty());

    // A copy appears later; the next scan pairs it with the existing record.
    write_with_mtime(&media.path().join("copy.jpg"), &[5u8; 2048], 2_000);
    let outcome = scan(&store, media.path());
    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].count(), 2);
}
