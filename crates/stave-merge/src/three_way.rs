//! Three-way field merge
//!
//! Both sides are diffed against their common ancestor item by item. Edits to
//! different fields combine losslessly; edits to the same field resolve in
//! favour of the winning [`Side`], and are reported as [`FieldConflict`]s.

use crate::policy::Side;
use stave_delta::{DeltaType, FieldDelta, ItemId, ItemSnapshot, Payload};
use std::collections::{BTreeMap, BTreeSet};

/// Item snapshots keyed by identity
pub type SnapshotMap = BTreeMap<ItemId, ItemSnapshot>;

/// One field both sides changed to different values
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    /// Affected item
    pub item: ItemId,
    /// Affected field
    pub delta_type: DeltaType,
    /// Local value
    pub local: Payload,
    /// Remote value
    pub remote: Payload,
    /// Side whose value was kept
    pub winner: Side,
}

impl FieldConflict {
    /// The value kept in the merge result
    #[inline]
    #[must_use]
    pub fn resolved(&self) -> &Payload {
        match self.winner {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }
}

/// Outcome of a three-way merge
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    /// Merged item states
    pub items: SnapshotMap,
    /// Same-field conflicts, resolved by policy
    pub conflicts: Vec<FieldConflict>,
    /// Fields changed on the local side since the ancestor
    pub local_changes: usize,
    /// Fields changed on the remote side since the ancestor
    pub remote_changes: usize,
}

impl MergeResult {
    /// True if no field was changed on both sides
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Field-granular three-way merge with a fixed winning side
#[derive(Debug, Clone, Copy)]
pub struct ThreeWayMerge {
    winner: Side,
}

impl ThreeWayMerge {
    /// Merge resolving conflicts toward `winner`
    #[inline]
    #[must_use]
    pub const fn new(winner: Side) -> Self {
        Self { winner }
    }

    /// Winning side
    #[inline]
    #[must_use]
    pub const fn winner(&self) -> Side {
        self.winner
    }

    /// Merge `local` and `remote` over `ancestor`
    ///
    /// Items missing on one side count as unchanged there. The loser's changes
    /// are applied to the ancestor first and the winner's on top, so the winner
    /// is the last writer of every conflicting field.
    #[must_use]
    pub fn merge(
        &self,
        ancestor: &SnapshotMap,
        local: &SnapshotMap,
        remote: &SnapshotMap,
    ) -> MergeResult {
        let ids: BTreeSet<ItemId> = ancestor
            .keys()
            .chain(local.keys())
            .chain(remote.keys())
            .copied()
            .collect();

        let mut result = MergeResult::default();
        for id in ids {
            let local_item = local.get(&id);
            let remote_item = remote.get(&id);
            let Some(base) = ancestor
                .get(&id)
                .cloned()
                .or_else(|| local_item.or(remote_item).map(ItemSnapshot::empty_like))
            else {
                continue;
            };

            let local_delta = local_item.map(|s| s.changes_since(&base)).unwrap_or_default();
            let remote_delta = remote_item.map(|s| s.changes_since(&base)).unwrap_or_default();
            result.local_changes += local_delta.len();
            result.remote_changes += remote_delta.len();
            result
                .conflicts
                .extend(self.conflicts_of(id, &local_delta, &remote_delta));

            let (first, second, named) = match self.winner {
                Side::Local => (&remote_delta, &local_delta, local_item.or(remote_item)),
                Side::Remote => (&local_delta, &remote_delta, remote_item.or(local_item)),
            };
            let mut merged = base;
            merged.apply_fields(first);
            merged.apply_fields(second);
            if let Some(named) = named {
                merged.set_name(named.name());
            }
            result.items.insert(id, merged);
        }

        tracing::debug!(
            winner = %self.winner,
            items = result.items.len(),
            conflicts = result.conflicts.len(),
            "three-way merge"
        );
        result
    }

    fn conflicts_of(
        &self,
        item: ItemId,
        local: &[FieldDelta],
        remote: &[FieldDelta],
    ) -> Vec<FieldConflict> {
        local
            .iter()
            .filter_map(|ours| {
                let theirs = remote
                    .iter()
                    .find(|f| f.delta_type() == ours.delta_type())?;
                (theirs.payload != ours.payload).then(|| FieldConflict {
                    item,
                    delta_type: ours.delta_type().clone(),
                    local: ours.payload.clone(),
                    remote: theirs.payload.clone(),
                    winner: self.winner,
                })
            })
            .collect()
    }
}
