//! Stave Delta Framework
//!
//! Field-granular change tracking for heterogeneous project components.
//!
//! # Core Concepts
//!
//! - [`Delta`]: Named, typed unit of change; one per versioned field
//! - [`Payload`]: Schema-less key-value bag carried next to a delta
//! - [`TrackedItem`]: Capability every versionable component implements
//! - [`DiffLogic`]: Per-kind strategy that diffs and merges delta sets
//! - [`DeltaKind`]: Closed table of one kind's delta types
//! - [`ItemSnapshot`]: Frozen delta set, used as the transient reconciliation view
//!
//! # Example
//!
//! ```rust,ignore
//! use stave_delta::{items::ProjectMetadata, ItemSnapshot, TrackedItem};
//!
//! let mut meta = ProjectMetadata::new("Song", "Alice");
//! let before = ItemSnapshot::capture(&meta);
//! meta.set_author("Bob");
//!
//! // Only the author delta differs
//! let diff = meta.diff_logic().create_diff(&before, &meta);
//! assert_eq!(diff.len(), 1);
//!
//! // Roll back field by field
//! meta.reset_state_to(&before);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
mod delta;
mod diff_logic;
mod document;
mod payload;
mod snapshot;
mod tracked;

/// Concrete tracked item kinds
pub mod items;

// Re-exports
pub use delta::{out_of_range_delta, Delta, DeltaType, FieldDelta, DELTA_NODE};
pub use diff_logic::{DeltaKind, DiffLogic, KindDiffLogic, PayloadDiffLogic, OPAQUE_ITEM_TYPE};
pub use document::{DocumentError, DocumentNode};
pub use payload::{Payload, PayloadError, VALUE_KEY};
pub use snapshot::{ItemSnapshot, SNAPSHOT_NODE};
pub use tracked::{
    replace_if_changed, ChangeBroadcaster, ChangeListener, ItemChange, ItemId, ProjectTree,
    TrackedItem,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::items::{ProjectMetadata, TrackHeader};
    use super::*;

    struct Tree {
        meta: ProjectMetadata,
        tracks: Vec<TrackHeader>,
    }

    impl ProjectTree for Tree {
        fn tracked_items(&self) -> Vec<&dyn TrackedItem> {
            let mut items: Vec<&dyn TrackedItem> = vec![&self.meta];
            items.extend(self.tracks.iter().map(|t| t as &dyn TrackedItem));
            items
        }

        fn tracked_item_mut(&mut self, id: ItemId) -> Option<&mut dyn TrackedItem> {
            if self.meta.vcs_id() == id {
                return Some(&mut self.meta);
            }
            self.tracks
                .iter_mut()
                .find(|t| t.vcs_id() == id)
                .map(|t| t as &mut dyn TrackedItem)
        }
    }

    #[test]
    fn capture_edit_and_roll_back_heterogeneous_items() {
        let mut tree = Tree {
            meta: ProjectMetadata::new("Song", "Alice"),
            tracks: vec![TrackHeader::new("Drums"), TrackHeader::new("Bass")],
        };
        let before: Vec<ItemSnapshot> = tree
            .tracked_items()
            .into_iter()
            .map(ItemSnapshot::capture)
            .collect();

        tree.meta.set_author("Bob");
        tree.tracks[1].set_muted(true);

        let changed: usize = before
            .iter()
            .map(|snap| {
                let item = tree.tracked_item(snap.id()).unwrap();
                item.diff_logic().create_diff(snap, item).len()
            })
            .sum();
        assert_eq!(changed, 2);

        let restored: usize = before
            .iter()
            .map(|snap| tree.tracked_item_mut(snap.id()).unwrap().reset_state_to(snap))
            .sum();
        assert_eq!(restored, 2);
        assert_eq!(tree.meta.author(), "Alice");
        assert!(!tree.tracks[1].is_muted());
    }

    #[test]
    fn snapshot_document_survives_json() {
        let meta = ProjectMetadata::new("Song", "Alice");
        let snap = ItemSnapshot::capture(&meta);
        let json = snap.serialize().to_json().unwrap();

        let mut back = ItemSnapshot::new(ItemId::new(), "", "");
        back.deserialize(&DocumentNode::from_json(&json).unwrap())
            .unwrap();
        assert_eq!(back, snap);
        assert_eq!(back.field_deltas(), meta.field_deltas());
    }

    #[test]
    fn item_ids_follow_tree_order() {
        let tree = Tree {
            meta: ProjectMetadata::new("Song", "Alice"),
            tracks: vec![TrackHeader::new("Drums")],
        };
        let ids = tree.item_ids();
        assert_eq!(ids, vec![tree.meta.vcs_id(), tree.tracks[0].vcs_id()]);
    }
}
