//! Error types for Stave Core
//!
//! Provides error handling for:
//! - No-op requests (empty commit, empty stash slot)
//! - Unknown or diverged history
//! - Remote failures and cancellation
//! - Persistence and configuration problems

use crate::config::ConfigError;
use crate::remote::RemoteError;
use crate::revision::RevisionId;
use stave_delta::DocumentError;

/// Main version control error type
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Nothing differs from head
    #[error("nothing to commit")]
    EmptyCommit,

    /// Revision id not present in history
    #[error("unknown revision {0}")]
    UnknownRevision(RevisionId),

    /// Local and remote share no ancestor
    #[error("history diverged: local {local} and remote {remote} share no ancestor")]
    DivergedHistory {
        /// Local head
        local: RevisionId,
        /// Remote head
        remote: RevisionId,
    },

    /// No revision has been committed yet
    #[error("repository has no head revision")]
    NoHead,

    /// Stash slot is empty
    #[error("nothing stashed")]
    NothingStashed,

    /// Remote could not be reached or failed
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Remote refused a revision
    #[error("push rejected: {0}")]
    PushRejected(String),

    /// Remote operation cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Document could not be read
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// Stored or received revision does not match its id
    #[error("revision {0} failed verification")]
    IntegrityViolation(RevisionId),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl VcsError {
    /// Check if the request was a harmless no-op
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::EmptyCommit | Self::NothingStashed)
    }

    /// Check if the user has to pick how to proceed
    #[inline]
    #[must_use]
    pub fn requires_user_choice(&self) -> bool {
        matches!(self, Self::DivergedHistory { .. })
    }

    /// Check if the error came from the remote side
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnavailable(_) | Self::PushRejected(_) | Self::Cancelled
        )
    }

    /// Check if the operation was cancelled
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<RemoteError> for VcsError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Cancelled => Self::Cancelled,
            other => Self::RemoteUnavailable(other.to_string()),
        }
    }
}
