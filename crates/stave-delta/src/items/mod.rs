//! Concrete tracked item kinds

mod metadata;
mod track;

pub use metadata::{ProjectMetadata, ProjectMetadataDelta, DEFAULT_LICENSE, PROJECT_INFO_NODE};
pub use track::{TrackDelta, TrackHeader, TrackValue, DEFAULT_COLOUR, TRACK_NODE};
