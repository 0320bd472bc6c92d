//! Read-then-group duplicate derivation.

use crate::store::{FileStore, StoreResult};

use super::DuplicateGroup;

/// Derives duplicate groups entirely from file store state.
///
/// No caching: re-running after the store changes reflects the new state
/// exactly.
pub struct Grouper<'a> {
    store: &'a FileStore,
}

impl<'a> Grouper<'a> {
    #[must_use]
    pub fn new(store: &'a FileStore) -> Self {
        Self { store }
    }

    /// Compute all duplicate groups, ordered by potential savings
    /// descending.
    ///
    /// For each grouping-query summary the member records are fetched by
    /// hash, ordered oldest-first. A group whose membership fell below two
    /// between the two reads (a member was concurrently deleted) is
    /// dropped rather than emitted undersized.
    pub fn groups(&self) -> StoreResult<Vec<DuplicateGroup>> {
        let summaries = self.store.duplicate_group_summaries()?;
        let mut groups = Vec::with_capacity(summaries.len());

        for summary in summaries {
            let members = self.store.files_by_hash(&summary.content_hash)?;
            match DuplicateGroup::from_members(summary.content_hash.clone(), members) {
                Some(group) => groups.push(group),
                None => {
                    log::debug!(
                        "Dropping group {}: membership fell below 2 between reads",
                        summary.content_hash
                    );
                }
            }
        }

        groups.sort_by(|a, b| b.potential_savings().cmp(&a.potential_savings()));
        Ok(groups)
    }
}
