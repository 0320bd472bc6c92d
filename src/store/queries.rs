//! CRUD and derived-query operations over the file store.
//!
//! All mutation operations are atomic per call: batch upserts, flag
//! recomputation, and soft deletes each run in a single transaction, so a
//! reader never sees a partially applied batch.

use rusqlite::{params, Row};

use super::{
    DuplicateGroupSummary, FileRecord, FileStore, MediaType, ScanSessionRecord, StoreResult,
};

/// Subquery selecting every hash shared by two or more active records.
/// This is the single grouping pass duplicate detection rests on.
const DUPLICATED_HASHES: &str = "SELECT content_hash FROM files \
     WHERE is_deleted = 0 AND content_hash IS NOT NULL \
     GROUP BY content_hash HAVING COUNT(*) > 1";

const FILE_COLUMNS: &str = "id, locator, display_name, mime_type, bucket, size, date_modified, \
     content_hash, media_type, is_duplicate, group_hash, is_deleted, created_at";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        locator: row.get(1)?,
        display_name: row.get(2)?,
        mime_type: row.get(3)?,
        bucket: row.get(4)?,
        size: row.get::<_, i64>(5)? as u64,
        date_modified: row.get(6)?,
        content_hash: row.get(7)?,
        media_type: MediaType::from_str_lossy(&row.get::<_, String>(8)?),
        is_duplicate: row.get(9)?,
        group_hash: row.get(10)?,
        is_deleted: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ScanSessionRecord> {
    Ok(ScanSessionRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        files_scanned: row.get::<_, i64>(3)? as u64,
        bytes_scanned: row.get::<_, i64>(4)? as u64,
        duplicates_found: row.get::<_, i64>(5)? as u64,
        bytes_potentially_saved: row.get::<_, i64>(6)? as u64,
        error: row.get(7)?,
    })
}

impl FileStore {
    // ── File records ─────────────────────────────────────────────

    /// Insert or overwrite records by id, as one transaction.
    ///
    /// Rejects the whole batch if any record carries a malformed content
    /// hash; no partial application.
    pub fn upsert(&self, records: &[FileRecord]) -> StoreResult<usize> {
        Self::check_hashes(records)?;

        let tx = self.connection().unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO files \
                 (id, locator, display_name, mime_type, bucket, size, date_modified, \
                  content_hash, media_type, is_duplicate, group_hash, is_deleted, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
                 ON CONFLICT(id) DO UPDATE SET \
                     locator = excluded.locator, \
                     display_name = excluded.display_name, \
                     mime_type = excluded.mime_type, \
                     bucket = excluded.bucket, \
                     size = excluded.size, \
                     date_modified = excluded.date_modified, \
                     content_hash = excluded.content_hash, \
                     is_duplicate = excluded.is_duplicate, \
                     group_hash = excluded.group_hash, \
                     is_deleted = excluded.is_deleted",
            )?;
            for record in records {
                count += stmt.execute(params![
                    record.id,
                    record.locator,
                    record.display_name,
                    record.mime_type,
                    record.bucket,
                    record.size as i64,
                    record.date_modified,
                    record.content_hash,
                    record.media_type.as_str(),
                    record.is_duplicate,
                    record.group_hash,
                    record.is_deleted,
                    record.created_at,
                ])?;
            }
        }
        tx.commit()?;
        self.bump_generation();
        log::debug!("Upserted {} file records", count);
        Ok(count)
    }

    /// All records not soft-deleted.
    pub fn active_files(&self) -> StoreResult<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE is_deleted = 0 ORDER BY id"
        ))?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Active records of one media type.
    pub fn files_by_type(&self, media_type: MediaType) -> StoreResult<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {FILE_COLUMNS} FROM files \
             WHERE is_deleted = 0 AND media_type = ?1 ORDER BY id"
        ))?;
        let records = stmt
            .query_map(params![media_type.as_str()], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Active records at or above `min_size`, largest first.
    pub fn large_files(&self, min_size: u64) -> StoreResult<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {FILE_COLUMNS} FROM files \
             WHERE is_deleted = 0 AND size >= ?1 ORDER BY size DESC"
        ))?;
        let records = stmt
            .query_map(params![min_size as i64], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Active records sharing a content hash, oldest modification first.
    pub fn files_by_hash(&self, hash: &str) -> StoreResult<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {FILE_COLUMNS} FROM files \
             WHERE is_deleted = 0 AND content_hash = ?1 ORDER BY date_modified ASC, id ASC"
        ))?;
        let records = stmt
            .query_map(params![hash], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Active records still awaiting a hash; resume point for interrupted
    /// fingerprinting work.
    pub fn files_without_hash(&self, limit: u32) -> StoreResult<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {FILE_COLUMNS} FROM files \
             WHERE is_deleted = 0 AND content_hash IS NULL ORDER BY id LIMIT ?1"
        ))?;
        let records = stmt
            .query_map(params![limit], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// One grouping pass over active hashed records: hashes shared by two
    /// or more records, with member count and total size.
    pub fn duplicate_group_summaries(&self) -> StoreResult<Vec<DuplicateGroupSummary>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT content_hash, COUNT(*), SUM(size) FROM files \
             WHERE is_deleted = 0 AND content_hash IS NOT NULL \
             GROUP BY content_hash HAVING COUNT(*) > 1 \
             ORDER BY SUM(size) DESC",
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(DuplicateGroupSummary {
                    content_hash: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                    total_size: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    /// Recompute the derived `is_duplicate`/`group_hash` fields from
    /// current hash values, in one transaction.
    ///
    /// Returns the number of rows whose flags changed.
    pub fn recompute_duplicate_flags(&self) -> StoreResult<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let cleared = tx.execute(
            &format!(
                "UPDATE files SET is_duplicate = 0, group_hash = NULL \
                 WHERE is_duplicate = 1 AND (is_deleted = 1 OR content_hash IS NULL \
                    OR content_hash NOT IN ({DUPLICATED_HASHES}))"
            ),
            [],
        )?;
        let flagged = tx.execute(
            &format!(
                "UPDATE files SET is_duplicate = 1, group_hash = content_hash \
                 WHERE is_deleted = 0 AND is_duplicate = 0 \
                   AND content_hash IN ({DUPLICATED_HASHES})"
            ),
            [],
        )?;
        tx.commit()?;
        self.bump_generation();
        log::debug!(
            "Recomputed duplicate flags: {} flagged, {} cleared",
            flagged,
            cleared
        );
        Ok(flagged + cleared)
    }

    /// Soft-delete the given records. Rows remain until purged.
    pub fn mark_deleted(&self, ids: &[String]) -> StoreResult<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached("UPDATE files SET is_deleted = 1 WHERE id = ?1")?;
            for id in ids {
                count += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        self.bump_generation();
        log::debug!("Soft-deleted {} records", count);
        Ok(count)
    }

    /// Physically remove soft-deleted rows created before `timestamp`
    /// (epoch milliseconds).
    pub fn purge_deleted_before(&self, timestamp: i64) -> StoreResult<usize> {
        let count = self.connection().execute(
            "DELETE FROM files WHERE is_deleted = 1 AND created_at < ?1",
            params![timestamp],
        )?;
        if count > 0 {
            self.bump_generation();
        }
        log::debug!("Purged {} deleted records", count);
        Ok(count)
    }

    // ── Aggregates ───────────────────────────────────────────────

    /// Count and total size of active records.
    pub fn total_files(&self) -> StoreResult<(u64, u64)> {
        let (count, size): (i64, i64) = self.connection().query_row(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM files WHERE is_deleted = 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((count as u64, size as u64))
    }

    /// Count and total size of active duplicate-flagged records.
    pub fn duplicate_files(&self) -> StoreResult<(u64, u64)> {
        let (count, size): (i64, i64) = self.connection().query_row(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM files \
             WHERE is_deleted = 0 AND is_duplicate = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((count as u64, size as u64))
    }

    /// Count and total size of active records at or above `min_size`.
    pub fn large_file_totals(&self, min_size: u64) -> StoreResult<(u64, u64)> {
        let (count, size): (i64, i64) = self.connection().query_row(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM files \
             WHERE is_deleted = 0 AND size >= ?1",
            params![min_size as i64],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((count as u64, size as u64))
    }

    /// Bytes reclaimable by keeping exactly one copy per duplicate group.
    ///
    /// The kept copy is the oldest member, matching the per-group figure.
    /// SQLite's bare-column rule makes `size` come from the row holding
    /// `MIN(date_modified)`.
    pub fn potential_savings(&self) -> StoreResult<u64> {
        let savings: i64 = self.connection().query_row(
            "SELECT COALESCE(SUM(group_total - kept_size), 0) FROM ( \
                 SELECT SUM(size) AS group_total, MIN(date_modified), size AS kept_size \
                 FROM files \
                 WHERE is_deleted = 0 AND content_hash IS NOT NULL \
                 GROUP BY content_hash HAVING COUNT(*) > 1)",
            [],
            |row| row.get(0),
        )?;
        Ok(savings as u64)
    }

    // ── Scan sessions ────────────────────────────────────────────

    /// Record a newly started scan session.
    pub fn create_session(&self, session: &ScanSessionRecord) -> StoreResult<()> {
        self.connection().execute(
            "INSERT INTO scan_sessions \
             (id, started_at, finished_at, files_scanned, bytes_scanned, \
              duplicates_found, bytes_potentially_saved, error) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session.id,
                session.started_at,
                session.finished_at,
                session.files_scanned as i64,
                session.bytes_scanned as i64,
                session.duplicates_found as i64,
                session.bytes_potentially_saved as i64,
                session.error,
            ],
        )?;
        self.bump_generation();
        Ok(())
    }

    /// Finalize a successful session. The row is never mutated afterwards.
    pub fn finish_session(
        &self,
        id: &str,
        finished_at: i64,
        files_scanned: u64,
        bytes_scanned: u64,
        duplicates_found: u64,
        bytes_potentially_saved: u64,
    ) -> StoreResult<()> {
        self.connection().execute(
            "UPDATE scan_sessions SET finished_at = ?2, files_scanned = ?3, \
             bytes_scanned = ?4, duplicates_found = ?5, bytes_potentially_saved = ?6 \
             WHERE id = ?1 AND finished_at IS NULL",
            params![
                id,
                finished_at,
                files_scanned as i64,
                bytes_scanned as i64,
                duplicates_found as i64,
                bytes_potentially_saved as i64,
            ],
        )?;
        self.bump_generation();
        Ok(())
    }

    /// Finalize a failed session with zero results and an error marker,
    /// distinguishable from "succeeded, found nothing".
    pub fn fail_session(&self, id: &str, finished_at: i64, error: &str) -> StoreResult<()> {
        self.connection().execute(
            "UPDATE scan_sessions SET finished_at = ?2, error = ?3 \
             WHERE id = ?1 AND finished_at IS NULL",
            params![id, finished_at, error],
        )?;
        self.bump_generation();
        Ok(())
    }

    /// Most recently started session, if any.
    pub fn last_session(&self) -> StoreResult<Option<ScanSessionRecord>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT id, started_at, finished_at, files_scanned, bytes_scanned, \
                    duplicates_found, bytes_potentially_saved, error \
             FROM scan_sessions ORDER BY started_at DESC, id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map([], session_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Fetch one session by id.
    pub fn session(&self, id: &str) -> StoreResult<Option<ScanSessionRecord>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT id, started_at, finished_at, files_scanned, bytes_scanned, \
                    duplicates_found, bytes_potentially_saved, error \
             FROM scan_sessions WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], session_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// All sessions, newest first.
    pub fn sessions(&self) -> StoreResult<Vec<ScanSessionRecord>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT id, started_at, finished_at, files_scanned, bytes_scanned, \
                    duplicates_found, bytes_potentially_saved, error \
             FROM scan_sessions ORDER BY started_at DESC, id DESC",
        )?;
        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    /// Remove sessions started before `timestamp` (epoch milliseconds).
    pub fn delete_sessions_before(&self, timestamp: i64) -> StoreResult<usize> {
        let count = self.connection().execute(
            "DELETE FROM scan_sessions WHERE started_at < ?1",
            params![timestamp],
        )?;
        if count > 0 {
            self.bump_generation();
        }
        Ok(count)
    }
}
