//! Quick-stash slot contents

use crate::revision::RevisionId;
use chrono::{DateTime, Utc};
use stave_delta::{ItemId, ItemSnapshot};
use stave_merge::SnapshotMap;

/// Dirty changes set aside from the working tree
///
/// Each snapshot holds only the fields that differed from `base`.
#[derive(Debug, Clone, PartialEq)]
pub struct Stash {
    base: RevisionId,
    created_at: DateTime<Utc>,
    changes: SnapshotMap,
}

impl Stash {
    /// Create stash; snapshots without fields are dropped
    #[must_use]
    pub fn new(
        base: RevisionId,
        created_at: DateTime<Utc>,
        changes: impl IntoIterator<Item = ItemSnapshot>,
    ) -> Self {
        Self {
            base,
            created_at,
            changes: changes
                .into_iter()
                .filter(|snap| !snap.is_empty())
                .map(|snap| (snap.id(), snap))
                .collect(),
        }
    }

    /// Revision the changes were made on
    #[inline]
    #[must_use]
    pub fn base(&self) -> RevisionId {
        self.base
    }

    /// When the stash was taken
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Stashed changes per item
    #[inline]
    #[must_use]
    pub fn changes(&self) -> &SnapshotMap {
        &self.changes
    }

    /// Stashed changes of one item
    #[inline]
    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&ItemSnapshot> {
        self.changes.get(&id)
    }

    /// Number of stashed fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.values().map(ItemSnapshot::len).sum()
    }

    /// True if nothing is stashed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
