//! Stave Core - Revision History Engine
//!
//! Embedded version control for a music project:
//! - Records item states into content-addressed revisions
//! - Checks revisions out by reconciling live items field by field
//! - Sets dirty changes aside in a single stash slot
//! - Merges divergent histories with a three-way, per-field merge
//! - Clones, pulls and pushes through an abstract remote, with cancellation
//!
//! # Example
//!
//! ```rust,ignore
//! use stave_core::{VcsConfig, VersionControl};
//!
//! let mut vcs = VersionControl::init(&project, VcsConfig::new())?;
//! project.metadata_mut().set_author("Bob");
//! let id = vcs.commit(&project, "Credit Bob", "Bob")?;
//!
//! // Back to the root revision, then forward again
//! let root = vcs.log().last().map(|rev| rev.id()).unwrap();
//! vcs.checkout(&mut project, root)?;
//! vcs.checkout(&mut project, id)?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod logging;
pub mod node;
pub mod persistence;
pub mod remote;
pub mod revision;
pub mod stash;

// Re-exports for convenience
pub use config::{ConfigError, StashPolicy, VcsConfig};
pub use engine::{
    ItemStatus, MergeOutcome, VcsEvent, VcsListener, VersionControl, WorkingState,
    INITIAL_MESSAGE, VCS_NODE,
};
pub use error::VcsError;
pub use history::History;
pub use logging::{init_from_config, init_tracing};
pub use node::{RemoteConnector, RemoteLocator, StashToggle, VersionControlNode};
pub use persistence::{DocumentStore, MemoryStore};
pub use remote::{guard, PushOutcome, Remote, RemoteError, RemoteHead};
pub use revision::{Revision, RevisionId, RevisionIdError};
pub use stash::Stash;

pub use stave_merge::{ConflictPolicy, FieldConflict, Side};
pub use tokio_util::sync::CancellationToken;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Stave Core
    pub use crate::{
        CancellationToken, ConflictPolicy, MergeOutcome, Remote, RevisionId, VcsConfig, VcsError,
        VersionControl, VersionControlNode,
    };
    pub use stave_delta::{ItemId, ProjectTree, TrackedItem};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use stave_delta::items::{ProjectMetadata, TrackHeader};
    use stave_delta::{ItemId, ItemSnapshot, ProjectTree, TrackedItem};

    struct Project {
        meta: ProjectMetadata,
        tracks: Vec<TrackHeader>,
    }

    impl ProjectTree for Project {
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

        fn create_item(&mut self, snapshot: &ItemSnapshot) -> Option<&mut dyn TrackedItem> {
            if snapshot.kind() != stave_delta::items::TRACK_NODE {
                return None;
            }
            self.tracks.push(TrackHeader::new("").with_id(snapshot.id()));
            self.tracks.last_mut().map(|t| t as &mut dyn TrackedItem)
        }

        fn remove_item(&mut self, id: ItemId) -> bool {
            let before = self.tracks.len();
            self.tracks.retain(|t| t.vcs_id() != id);
            self.tracks.len() != before
        }
    }

    fn project() -> Project {
        Project {
            meta: ProjectMetadata::new("Song", "Alice"),
            tracks: vec![TrackHeader::new("Drums")],
        }
    }

    #[test]
    fn commit_checkout_round_trip() {
        let mut project = project();
        let mut vcs = VersionControl::init(&project, VcsConfig::new()).unwrap();
        let root = vcs.head().unwrap();

        project.meta.set_author("Bob");
        project.tracks[0].set_muted(true);
        let second = vcs.commit(&project, "Bob mutes drums", "Bob").unwrap();

        assert_eq!(vcs.checkout(&mut project, root).unwrap(), 2);
        assert_eq!(project.meta.author(), "Alice");
        assert!(!project.tracks[0].is_muted());
        assert!(vcs.status(&project).is_clean());

        assert_eq!(vcs.checkout(&mut project, second).unwrap(), 2);
        assert_eq!(project.meta.author(), "Bob");
        assert_eq!(vcs.log().len(), 2);
    }

    #[test]
    fn checkout_recreates_missing_track() {
        let mut project = project();
        let mut vcs = VersionControl::init(&project, VcsConfig::new()).unwrap();
        let root = vcs.head().unwrap();
        let drums = project.tracks[0].vcs_id();

        project.tracks.clear();
        assert_eq!(vcs.checkout(&mut project, root).unwrap(), 1);
        assert_eq!(project.tracks.len(), 1);
        assert_eq!(project.tracks[0].vcs_id(), drums);
        assert_eq!(project.tracks[0].path(), "Drums");
    }

    #[test]
    fn checkout_removes_track_added_later() {
        let mut project = project();
        let mut vcs = VersionControl::init(&project, VcsConfig::new()).unwrap();
        let root = vcs.head().unwrap();

        project.tracks.push(TrackHeader::new("Bass"));
        vcs.commit(&project, "add bass", "Alice").unwrap();

        assert_eq!(vcs.checkout(&mut project, root).unwrap(), 4);
        assert_eq!(project.tracks.len(), 1);
        assert_eq!(project.tracks[0].path(), "Drums");
        assert!(vcs.status(&project).is_clean());
    }

    #[test]
    fn persisted_engine_survives_json() {
        let mut project = project();
        let mut vcs = VersionControl::init(&project, VcsConfig::new()).unwrap();
        project.meta.set_title("Song 2");
        vcs.commit(&project, "retitle", "Alice").unwrap();

        let json = vcs.serialize().to_json().unwrap();
        let mut back = VersionControl::new(VcsConfig::new());
        back.deserialize(&stave_delta::DocumentNode::from_json(&json).unwrap())
            .unwrap();
        assert_eq!(back.head(), vcs.head());
        assert_eq!(back.history().len(), 2);
        assert!(back.status(&project).is_clean());
    }
}
