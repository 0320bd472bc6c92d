//! Duplicate group structure and its derived metrics.

use serde::Serialize;

use crate::store::FileRecord;

/// A set of active files sharing one content hash.
///
/// Members are ordered by `date_modified` ascending, so the first element
/// is conventionally "the original". Only sets with two or more members
/// form a group.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    /// The shared 64-hex SHA-256 digest.
    pub content_hash: String,
    /// Member records, oldest modification first.
    pub files: Vec<FileRecord>,
}

impl DuplicateGroup {
    /// Build a group from members already ordered oldest-first.
    ///
    /// Returns `None` when fewer than two members remain; a group is
    /// never emitted with count < 2.
    #[must_use]
    pub fn from_members(content_hash: String, files: Vec<FileRecord>) -> Option<Self> {
        if files.len() < 2 {
            return None;
        }
        Some(Self {
            content_hash,
            files,
        })
    }

    /// Number of members, always >= 2.
    #[must_use]
    pub fn count(&self) -> usize {
        self.files.len()
    }

    /// Total size of all members.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Bytes reclaimable by keeping exactly one copy: total size minus
    /// the oldest member's size. Always >= 0.
    #[must_use]
    pub fn potential_savings(&self) -> u64 {
        self.total_size()
            .saturating_sub(self.files.first().map_or(0, |f| f.size))
    }

    /// Duplicate copies beyond the presumed original.
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.files.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MediaType;

    fn record(id: &str, size: u64, date_modified: i64) -> FileRecord {
        FileRecord::new(
            id.to_string(),
            format!("/f/{id}"),
            None,
            None,
            None,
            size,
            date_modified,
            MediaType::Image,
        )
    }

    fn h() -> String {
        "a".repeat(64)
    }

    #[test]
    fn test_from_members_requires_two() {
        assert!(DuplicateGroup::from_members(h(), vec![]).is_none());
        assert!(DuplicateGroup::from_members(h(), vec![record("a", 10, 1)]).is_none());
        assert!(
            DuplicateGroup::from_members(h(), vec![record("a", 10, 1), record("b", 10, 2)])
                .is_some()
        );
    }

    #[test]
    fn test_metrics() {
        let group = DuplicateGroup::from_members(
            h(),
            vec![
                record("old", 1024, 100),
                record("mid", 1024, 200),
                record("new", 1024, 300),
            ],
        )
        .unwrap();

        assert_eq!(group.count(), 3);
        assert_eq!(group.total_size(), 3072);
        assert_eq!(group.potential_savings(), 2048);
        assert_eq!(group.duplicate_count(), 2);
        assert_eq!(group.files[0].id, "old");
    }

    #[test]
    fn test_savings_never_negative() {
        let group =
            DuplicateGroup::from_members(h(), vec![record("a", 500, 1), record("b", 500, 2)])
                .unwrap();
        assert!(group.potential_savings() <= group.total_size());
    }
}
