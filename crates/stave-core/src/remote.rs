//! Remote capability and cancellation
//!
//! The engine never talks to the network itself. It consumes a [`Remote`]
//! that can report its head and accept revisions, and wraps every call in
//! [`guard`], which races it against a [`CancellationToken`] and the
//! configured timeout.

use crate::revision::{Revision, RevisionId};
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Remote head and the history leading to it
#[derive(Debug, Clone, Default)]
pub struct RemoteHead {
    /// Head revision, `None` for an empty remote
    pub head: Option<RevisionId>,
    /// Remote revisions, parents before children
    pub revisions: Vec<Revision>,
}

/// Remote answer to a pushed revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    Rejected(String),
}

/// Remote transport errors
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Transport failure
    #[error("{0}")]
    Unavailable(String),

    /// Call exceeded its time budget
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// Caller cancelled
    #[error("cancelled")]
    Cancelled,
}

/// Remote repository counterpart
#[async_trait]
pub trait Remote: Send + Sync + Debug {
    /// Fetch the remote head with its history
    ///
    /// # Errors
    /// Returns error if the remote cannot be reached
    async fn fetch_remote_head(&self) -> Result<RemoteHead, RemoteError>;

    /// Offer one revision
    ///
    /// # Errors
    /// Returns error if the remote cannot be reached
    async fn push_revision(&self, revision: &Revision) -> Result<PushOutcome, RemoteError>;
}

/// Run `fut` unless `token` is cancelled or `limit` elapses
///
/// # Errors
/// Returns [`RemoteError::Cancelled`] or [`RemoteError::TimedOut`], or the
/// future's own error
pub async fn guard<T, F>(token: &CancellationToken, limit: Duration, fut: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    if token.is_cancelled() {
        return Err(RemoteError::Cancelled);
    }
    tokio::select! {
        biased;
        () = token.cancelled() => Err(RemoteError::Cancelled),
        outcome = tokio::time::timeout(limit, fut) => match outcome {
            Ok(result) => result,
            Err(_) => Err(RemoteError::TimedOut(limit)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_passes_result_through() {
        let token = CancellationToken::new();
        let value = guard(&token, Duration::from_secs(1), async { Ok::<_, RemoteError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn guard_times_out() {
        let token = CancellationToken::new();
        let result = guard(&token, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, RemoteError>(())
        })
        .await;
        assert!(matches!(result, Err(RemoteError::TimedOut(_))));
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_call() {
        let token = CancellationToken::new();
        let child = token.child_token();
        let task = tokio::spawn(async move {
            guard(&child, Duration::from_secs(5), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, RemoteError>(())
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        assert!(matches!(task.await.unwrap(), Err(RemoteError::Cancelled)));
    }

    #[tokio::test]
    async fn already_cancelled_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let result = guard(&token, Duration::from_secs(1), async { Ok::<_, RemoteError>(1) }).await;
        assert!(matches!(result, Err(RemoteError::Cancelled)));
    }

    #[tokio::test]
    async fn cancelling_child_leaves_parent_running() {
        let token = CancellationToken::new();
        let child = token.child_token();
        child.cancel();
        assert!(!token.is_cancelled());
        let value = guard(&token, Duration::from_secs(1), async { Ok::<_, RemoteError>(3) })
            .await
            .unwrap();
        assert_eq!(value, 3);
    }
}
