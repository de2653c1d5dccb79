//! Stave Merge System
//!
//! Field-granular three-way reconciliation of project revisions.
//!
//! # Core Concepts
//!
//! - [`ConflictPolicy`]: Which side wins a same-field conflict
//! - [`ThreeWayMerge`]: Diffs both sides against the ancestor and combines them
//! - [`FieldConflict`]: A field both sides changed, with the resolved winner
//!
//! # Example
//!
//! ```rust,ignore
//! use stave_merge::{ConflictPolicy, ThreeWayMerge};
//!
//! let winner = ConflictPolicy::ByDivergence.winner(local_head != ancestor_id);
//! let result = ThreeWayMerge::new(winner).merge(&ancestor, &local, &remote);
//! for conflict in &result.conflicts {
//!     println!("{} kept {}", conflict.delta_type, conflict.winner);
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod policy;
mod three_way;

// Re-exports
pub use policy::{ConflictPolicy, Side};
pub use three_way::{FieldConflict, MergeResult, SnapshotMap, ThreeWayMerge};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
