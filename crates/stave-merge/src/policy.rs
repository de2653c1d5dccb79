//! Conflict resolution policy
//!
//! Decides which side wins when local and remote both changed the same field
//! since their common ancestor.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Side of a three-way merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The working copy and its committed history
    Local,
    /// The incoming remote head
    Remote,
}

impl Side {
    /// The other side
    #[inline]
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Remote => "remote",
        })
    }
}

/// Same-field conflict policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Remote always wins
    RemoteWins,
    /// Local always wins
    LocalWins,
    /// Remote wins unless local has committed past the divergence point
    #[default]
    ByDivergence,
}

impl ConflictPolicy {
    /// Winning side for a merge
    ///
    /// `local_committed_since_ancestor` is true when the local head is not the
    /// common ancestor itself.
    #[must_use]
    pub const fn winner(self, local_committed_since_ancestor: bool) -> Side {
        match self {
            Self::RemoteWins => Side::Remote,
            Self::LocalWins => Side::Local,
            Self::ByDivergence if local_committed_since_ancestor => Side::Local,
            Self::ByDivergence => Side::Remote,
        }
    }

    /// Policy name (for logs)
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RemoteWins => "remote_wins",
            Self::LocalWins => "local_wins",
            Self::ByDivergence => "by_divergence",
        }
    }
}
