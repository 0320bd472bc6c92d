//! Scan orchestration: one logical scan from catalog enumeration to
//! duplicate grouping.
//!
//! # Pipeline
//!
//! `Idle → Enumerating → Hashing → Persisting → Grouping → Completed`,
//! with a terminal `Failed` state reachable from any step on an
//! unrecoverable error. Per-file hash failures are tolerated and never
//! fail the scan; only enumeration being impossible or the store going
//! away is fatal.
//!
//! Hashing of individual files is parallelized across a bounded worker
//! pool since files are independent, but all store writes happen as one
//! batched upsert on the orchestrating thread, so readers never see a
//! torn batch or interleaved per-worker writes.
//!
//! Cancellation is cooperative: the flag is checked between files, never
//! preempting an in-flight hash. Whatever was persisted before the
//! cancellation point stays; there is no rollback.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use rayon::prelude::*;

use crate::catalog::{CatalogError, Indexer, MediaCatalog};
use crate::duplicates::{DuplicateGroup, Grouper};
use crate::fingerprint::{ContentSource, Fingerprinter};
use crate::progress::{ProgressCallback, SilentProgress};
use crate::store::{FileStore, ScanSessionRecord, StoreError};

/// Phases of the scan state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Enumerating,
    Hashing,
    Persisting,
    Grouping,
    Completed,
    Failed,
}

impl ScanPhase {
    /// Whether a new scan may start from this phase.
    #[must_use]
    fn may_start(self) -> bool {
        matches!(self, Self::Idle | Self::Completed | Self::Failed)
    }
}

/// Errors from the scan orchestrator.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// A second scan was requested while one is active. At most one scan
    /// runs at a time.
    #[error("a scan is already running")]
    AlreadyRunning,

    /// No media category could be enumerated (e.g., permission revoked).
    #[error("enumeration failed: {0}")]
    Enumeration(#[from] CatalogError),

    /// The file store failed; partial scan state is reported, not
    /// silently discarded.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a completed (or cancelled) scan.
#[derive(Debug)]
pub struct ScanOutcome {
    /// The finalized session record.
    pub session: ScanSessionRecord,
    /// Duplicate groups derived from the batch just persisted.
    pub groups: Vec<DuplicateGroup>,
    /// Files whose hash could not be computed; they remain persisted
    /// with a null hash and are picked up by a later scan.
    pub hash_failures: usize,
    /// Whether the scan stopped early at a cancellation point.
    pub cancelled: bool,
}

/// Sequences indexing, fingerprinting, persistence, and grouping as one
/// logical scan with observable progress.
///
/// The orchestrator is the only component that mutates the derived
/// `is_duplicate`/`group_hash` fields (through the store's recompute).
pub struct ScanOrchestrator<'a, C, S> {
    store: &'a FileStore,
    catalog: &'a C,
    fingerprinter: Fingerprinter<S>,
    io_threads: usize,
    cancel_flag: Arc<AtomicBool>,
    progress: Arc<dyn ProgressCallback>,
    phase: Mutex<ScanPhase>,
    percentage: AtomicU8,
}

impl<'a, C, S> ScanOrchestrator<'a, C, S>
where
    C: MediaCatalog,
    S: ContentSource,
{
    /// Create an orchestrator over the given store, catalog, and content
    /// source.
    #[must_use]
    pub fn new(store: &'a FileStore, catalog: &'a C, source: S) -> Self {
        Self {
            store,
            catalog,
            fingerprinter: Fingerprinter::new(source),
            io_threads: 4,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(SilentProgress),
            phase: Mutex::new(ScanPhase::Idle),
            percentage: AtomicU8::new(0),
        }
    }

    /// Number of worker threads for parallel fingerprinting.
    /// Lower values reduce disk thrashing on spinning media.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Share a cancellation flag with the caller (e.g., a Ctrl+C handler).
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = flag;
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Current phase of the state machine.
    #[must_use]
    pub fn phase(&self) -> ScanPhase {
        *self.phase.lock().unwrap()
    }

    /// Current overall percentage, 0 to 100. Never regresses within one
    /// scan.
    #[must_use]
    pub fn percentage(&self) -> u8 {
        self.percentage.load(Ordering::SeqCst)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: ScanPhase) {
        *self.phase.lock().unwrap() = phase;
        log::debug!("Scan phase: {:?}", phase);
    }

    /// Raise the percentage, never letting it regress.
    fn report_percentage(&self, pct: u8) {
        let pct = pct.min(100);
        let prev = self.percentage.fetch_max(pct, Ordering::SeqCst);
        if pct > prev {
            self.progress.on_percentage(pct);
        }
    }

    /// Run one full scan. The single `run()`-style entry point an
    /// external scheduler calls; retry and backoff policy live with the
    /// scheduler, not here.
    ///
    /// Refuses to start while another scan is active.
    pub fn run_scan(&self) -> Result<ScanOutcome, ScanError> {
        {
            let mut phase = self.phase.lock().unwrap();
            if !phase.may_start() {
                return Err(ScanError::AlreadyRunning);
            }
            *phase = ScanPhase::Enumerating;
        }
        self.percentage.store(0, Ordering::SeqCst);

        let session_id = new_session_id();
        let session = ScanSessionRecord {
            id: session_id.clone(),
            started_at: Utc::now().timestamp_millis(),
            finished_at: None,
            files_scanned: 0,
            bytes_scanned: 0,
            duplicates_found: 0,
            bytes_potentially_saved: 0,
            error: None,
        };
        if let Err(e) = self.store.create_session(&session) {
            self.set_phase(ScanPhase::Failed);
            return Err(e.into());
        }

        match self.run_pipeline(&session_id) {
            Ok(outcome) => {
                if !outcome.cancelled {
                    self.set_phase(ScanPhase::Completed);
                    self.report_percentage(100);
                }
                Ok(outcome)
            }
            Err(e) => {
                self.set_phase(ScanPhase::Failed);
                log::error!("Scan {} failed: {}", session_id, e);
                // Finalize with zero results and an explicit error marker,
                // distinguishable from "succeeded, found nothing".
                self.store
                    .fail_session(&session_id, Utc::now().timestamp_millis(), &e.to_string())
                    .ok();
                Err(e)
            }
        }
    }

    fn run_pipeline(&self, session_id: &str) -> Result<ScanOutcome, ScanError> {
        // ── Enumerating ──────────────────────────────────────────
        self.progress.on_phase_start("enumerating", 0);
        let (candidates, enum_stats) = Indexer::new(self.catalog).enumerate()?;
        self.progress.on_phase_end("enumerating");
        self.report_percentage(10);
        log::info!(
            "Scan {}: {} candidates enumerated",
            session_id,
            candidates.len()
        );

        if self.is_cancelled() {
            return self.finish_cancelled(session_id, 0, 0);
        }

        // ── Hashing ──────────────────────────────────────────────
        self.set_phase(ScanPhase::Hashing);
        self.progress.on_phase_start("hashing", candidates.len());
        let total = candidates.len();
        let (hashed, hash_failures) = self.hash_batch(candidates);
        self.progress.on_phase_end("hashing");
        self.report_percentage(80);

        if self.is_cancelled() {
            // Stop at the step boundary: nothing from this scan has been
            // persisted yet, and we issue no further work.
            return self.finish_cancelled(session_id, 0, 0);
        }

        // ── Persisting ───────────────────────────────────────────
        self.set_phase(ScanPhase::Persisting);
        self.progress.on_phase_start("persisting", hashed.len());
        let bytes_scanned: u64 = hashed.iter().map(|r| r.size).sum();
        let files_scanned = hashed.len() as u64;
        self.store.upsert(&hashed)?;
        self.store.recompute_duplicate_flags()?;
        self.progress.on_phase_end("persisting");
        self.report_percentage(90);

        // ── Grouping ─────────────────────────────────────────────
        self.set_phase(ScanPhase::Grouping);
        self.progress.on_phase_start("grouping", 0);
        let groups = Grouper::new(self.store).groups()?;
        self.progress.on_phase_end("grouping");

        let duplicates_found: u64 = groups.iter().map(|g| g.duplicate_count() as u64).sum();
        let bytes_potentially_saved: u64 = groups.iter().map(DuplicateGroup::potential_savings).sum();

        let finished_at = Utc::now().timestamp_millis();
        self.store.finish_session(
            session_id,
            finished_at,
            files_scanned,
            bytes_scanned,
            duplicates_found,
            bytes_potentially_saved,
        )?;

        log::info!(
            "Scan {} complete: {}/{} files hashed, {} duplicate groups, {} bytes reclaimable",
            session_id,
            total - hash_failures,
            total,
            groups.len(),
            bytes_potentially_saved
        );
        if !enum_stats.failed_categories.is_empty() {
            log::warn!(
                "Scan {} skipped categories: {}",
                session_id,
                enum_stats.failed_categories.join(", ")
            );
        }

        let session = self
            .store
            .session(session_id)?
            .expect("session row just finalized");
        Ok(ScanOutcome {
            session,
            groups,
            hash_failures,
            cancelled: false,
        })
    }

    /// Fingerprint a candidate batch on a bounded worker pool.
    ///
    /// Per-file failures leave the candidate unhashed and are counted,
    /// not propagated. Cancellation is honored between files.
    fn hash_batch(
        &self,
        candidates: Vec<crate::store::FileRecord>,
    ) -> (Vec<crate::store::FileRecord>, usize) {
        if candidates.is_empty() {
            return (Vec::new(), 0);
        }

        // Workers never touch the store; only what they need crosses into
        // the pool.
        let fingerprinter = &self.fingerprinter;
        let progress = Arc::clone(&self.progress);
        let cancel = Arc::clone(&self.cancel_flag);
        let done = AtomicUsize::new(0);
        let hash_one = |record: crate::store::FileRecord| {
            // Checked between files; an in-flight hash is never preempted.
            if cancel.load(Ordering::SeqCst) {
                return record;
            }
            let record = fingerprinter.hash_candidate(record);
            let n = done.fetch_add(1, Ordering::SeqCst) + 1;
            progress.on_progress(n, &record.locator);
            record
        };

        let hashed: Vec<crate::store::FileRecord> = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.io_threads)
            .build()
        {
            Ok(pool) => pool.install(|| candidates.into_par_iter().map(&hash_one).collect()),
            Err(e) => {
                log::warn!("Failed to create bounded hashing pool, running serially: {e}");
                candidates.into_iter().map(&hash_one).collect()
            }
        };

        let failures = hashed.iter().filter(|r| r.content_hash.is_none()).count();
        (hashed, failures)
    }

    fn finish_cancelled(
        &self,
        session_id: &str,
        files_scanned: u64,
        bytes_scanned: u64,
    ) -> Result<ScanOutcome, ScanError> {
        log::info!("Scan {} cancelled", session_id);
        let finished_at = Utc::now().timestamp_millis();
        self.store
            .fail_session(session_id, finished_at, "cancelled")?;
        self.set_phase(ScanPhase::Idle);
        let session = self
            .store
            .session(session_id)?
            .expect("session row just finalized");
        Ok(ScanOutcome {
            session: ScanSessionRecord {
                files_scanned,
                bytes_scanned,
                ..session
            },
            groups: Vec::new(),
            hash_failures: 0,
            cancelled: true,
        })
    }
}

/// Session ids are time-ordered and unique within a device.
fn new_session_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("scan-{}-{:06}", now.as_millis(), now.subsec_micros() % 1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FsCatalog;
    use crate::fingerprint::FsContentSource;
    use std::fs;
    use tempfile::TempDir;

    fn setup_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        // Two identical images, one unique, all above the 1 KiB floor.
        fs::write(dir.path().join("a.jpg"), vec![1u8; 2048]).unwrap();
        fs::write(dir.path().join("b.jpg"), vec![1u8; 2048]).unwrap();
        fs::write(dir.path().join("c.jpg"), vec![2u8; 4096]).unwrap();
        dir
    }

    #[test]
    fn test_scan_finds_duplicates_and_finalizes_session() {
        let dir = setup_tree();
        let store = FileStore::open_in_memory().unwrap();
        let catalog = FsCatalog::single_root(dir.path());
        let orchestrator = ScanOrchestrator::new(&store, &catalog, FsContentSource);

        let outcome = orchestrator.run_scan().unwrap();

        assert_eq!(orchestrator.phase(), ScanPhase::Completed);
        assert_eq!(outcome.session.files_scanned, 3);
        assert_eq!(outcome.session.bytes_scanned, 2048 + 2048 + 4096);
        assert_eq!(outcome.session.duplicates_found, 1);
        assert_eq!(outcome.session.bytes_potentially_saved, 2048);
        assert!(outcome.session.finished_at.is_some());
        assert!(outcome.session.error.is_none());
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].count(), 2);
        assert_eq!(outcome.hash_failures, 0);
        assert_eq!(orchestrator.percentage(), 100);
    }

    #[test]
    fn test_empty_device_completes_not_fails() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open_in_memory().unwrap();
        let catalog = FsCatalog::single_root(dir.path());
        let orchestrator = ScanOrchestrator::new(&store, &catalog, FsContentSource);

        let outcome = orchestrator.run_scan().unwrap();

        assert_eq!(orchestrator.phase(), ScanPhase::Completed);
        assert_eq!(outcome.session.files_scanned, 0);
        assert_eq!(outcome.session.duplicates_found, 0);
        assert!(outcome.session.error.is_none());
    }

    #[test]
    fn test_unenumerable_catalog_fails_scan() {
        let store = FileStore::open_in_memory().unwrap();
        // No category roots at all: enumeration is impossible.
        let catalog = FsCatalog::new();
        let orchestrator = ScanOrchestrator::new(&store, &catalog, FsContentSource);

        let err = orchestrator.run_scan().unwrap_err();
        assert!(matches!(err, ScanError::Enumeration(_)));
        assert_eq!(orchestrator.phase(), ScanPhase::Failed);

        // The session is finalized with zero files and an error marker.
        let session = store.last_session().unwrap().unwrap();
        assert!(session.finished_at.is_some());
        assert_eq!(session.files_scanned, 0);
        assert!(session.error.is_some());
    }

    #[test]
    fn test_documents_failure_still_detects_duplicates() {
        let dir = setup_tree();
        let store = FileStore::open_in_memory().unwrap();
        // Documents root left unconfigured: that category fails, the
        // rest proceed.
        let catalog = FsCatalog::new()
            .with_root(crate::catalog::MediaCategory::Image, dir.path())
            .with_root(crate::catalog::MediaCategory::Video, dir.path())
            .with_root(crate::catalog::MediaCategory::Audio, dir.path());
        let orchestrator = ScanOrchestrator::new(&store, &catalog, FsContentSource);

        let outcome = orchestrator.run_scan().unwrap();
        assert_eq!(orchestrator.phase(), ScanPhase::Completed);
        assert_eq!(outcome.groups.len(), 1);
    }

    #[test]
    fn test_pre_cancelled_scan_persists_nothing() {
        let dir = setup_tree();
        let store = FileStore::open_in_memory().unwrap();
        let catalog = FsCatalog::single_root(dir.path());
        let flag = Arc::new(AtomicBool::new(true));
        let orchestrator =
            ScanOrchestrator::new(&store, &catalog, FsContentSource).with_cancel_flag(flag);

        let outcome = orchestrator.run_scan().unwrap();
        assert!(outcome.cancelled);
        assert!(store.active_files().unwrap().is_empty());
        // Cancelled scans release the single-scan guard.
        assert_eq!(orchestrator.phase(), ScanPhase::Idle);
    }

    #[test]
    fn test_rescan_is_stable() {
        let dir = setup_tree();
        let store = FileStore::open_in_memory().unwrap();
        let catalog = FsCatalog::single_root(dir.path());
        let orchestrator = ScanOrchestrator::new(&store, &catalog, FsContentSource);

        let first = orchestrator.run_scan().unwrap();
        let second = orchestrator.run_scan().unwrap();

        // Repeated scans over an unchanged device reconcile to the same
        // state: same file count, same groups.
        assert_eq!(store.active_files().unwrap().len(), 3);
        assert_eq!(first.groups.len(), second.groups.len());
        assert_eq!(
            first.session.duplicates_found,
            second.session.duplicates_found
        );
        assert_eq!(store.sessions().unwrap().len(), 2);
    }

    #[test]
    fn test_hash_failures_are_tolerated() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ok.jpg"), vec![1u8; 2048]).unwrap();
        let store = FileStore::open_in_memory().unwrap();
        let catalog = FsCatalog::single_root(dir.path());

        struct FlakySource;
        impl ContentSource for FlakySource {
            fn open(
                &self,
                locator: &str,
            ) -> Result<Box<dyn std::io::Read>, crate::fingerprint::HashError> {
                Err(crate::fingerprint::HashError::NotAccessible(
                    locator.to_string(),
                ))
            }
        }

        let orchestrator = ScanOrchestrator::new(&store, &catalog, FlakySource);
        let outcome = orchestrator.run_scan().unwrap();

        // Every file failed to hash, but the scan still completes and the
        // unhashed records are persisted as resumable work.
        assert_eq!(orchestrator.phase(), ScanPhase::Completed);
        assert_eq!(outcome.hash_failures, 1);
        assert_eq!(store.files_without_hash(10).unwrap().len(), 1);
    }

    #[test]
    fn test_percentage_is_monotonic() {
        let store = FileStore::open_in_memory().unwrap();
        let catalog = FsCatalog::new();
        let orchestrator = ScanOrchestrator::new(&store, &catalog, FsContentSource);

        orchestrator.report_percentage(40);
        orchestrator.report_percentage(20);
        assert_eq!(orchestrator.percentage(), 40);
        orchestrator.report_percentage(150);
        assert_eq!(orchestrator.percentage(), 100);
    }
}
