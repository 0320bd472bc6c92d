//! SQLite connection management for the file store.
//!
//! Uses WAL mode with a busy timeout, and a `PRAGMA user_version` check
//! for schema migration. The schema keeps a primary key on `id` and a
//! secondary index on `content_hash`; the hash index backs the core
//! duplicate-grouping query and `files_by_hash`.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rusqlite::Connection;

use super::{StoreError, StoreResult};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS files (
    id              TEXT PRIMARY KEY,
    locator         TEXT NOT NULL,
    display_name    TEXT,
    mime_type       TEXT,
    bucket          TEXT,
    size            INTEGER NOT NULL CHECK (size >= 0),
    date_modified   INTEGER NOT NULL CHECK (date_modified >= 0),
    content_hash    TEXT,
    media_type      TEXT NOT NULL,
    is_duplicate    INTEGER NOT NULL DEFAULT 0,
    group_hash      TEXT,
    is_deleted      INTEGER NOT NULL DEFAULT 0,
    created_at      INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_content_hash ON files(content_hash);
CREATE INDEX IF NOT EXISTS idx_files_media_type ON files(media_type);

CREATE TABLE IF NOT EXISTS scan_sessions (
    id                      TEXT PRIMARY KEY,
    started_at              INTEGER NOT NULL,
    finished_at             INTEGER,
    files_scanned           INTEGER NOT NULL DEFAULT 0,
    bytes_scanned           INTEGER NOT NULL DEFAULT 0,
    duplicates_found        INTEGER NOT NULL DEFAULT 0,
    bytes_potentially_saved INTEGER NOT NULL DEFAULT 0,
    error                   TEXT
);
";

/// SQLite-backed file store.
///
/// A single owned instance is passed explicitly to each component; there
/// is no ambient global handle. Mutations bump a generation counter that
/// [`ChangeListener`]s poll to observe "something changed" without
/// re-querying from scratch.
pub struct FileStore {
    conn: Connection,
    generation: Arc<AtomicU64>,
}

impl FileStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store (used by tests and dry runs).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < SCHEMA_VERSION {
            log::debug!(
                "Migrating file store schema from version {} to {}",
                version,
                SCHEMA_VERSION
            );
            conn.execute_batch(SCHEMA)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }

        Ok(Self {
            conn,
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Borrow the underlying connection. Query implementations live in
    /// the `queries` module.
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Record that store state changed. Called by every mutation.
    pub(crate) fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Current mutation generation. Monotonically increasing.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Subscribe to change notifications.
    ///
    /// The listener observes all mutations made after this call; callers
    /// re-query whatever views they care about when `changed()` reports
    /// true.
    #[must_use]
    pub fn subscribe(&self) -> ChangeListener {
        ChangeListener {
            generation: Arc::clone(&self.generation),
            last_seen: self.generation(),
        }
    }

    /// Validate hashes on a batch before it is written.
    pub(crate) fn check_hashes(records: &[super::FileRecord]) -> StoreResult<()> {
        for record in records {
            if !record.has_valid_hash() {
                return Err(StoreError::InvalidHash {
                    id: record.id.clone(),
                    hash: record.content_hash.clone().unwrap_or_default(),
                });
            }
        }
        Ok(())
    }
}

/// Poll-style subscription to file store changes.
///
/// Replaces the reactive stream-of-lists style: the essential contract is
/// "callers can observe state changes without re-querying blind", not any
/// particular stream primitive.
#[derive(Debug, Clone)]
pub struct ChangeListener {
    generation: Arc<AtomicU64>,
    last_seen: u64,
}

impl ChangeListener {
    /// Whether the store changed since the last call (or since subscribe).
    pub fn changed(&mut self) -> bool {
        let current = self.generation.load(Ordering::SeqCst);
        let changed = current != self.last_seen;
        self.last_seen = current;
        changed
    }
}
