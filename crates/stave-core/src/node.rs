//! Version control node
//!
//! The object a project holds. Wraps a [`VersionControl`] engine, turns
//! no-op requests into plain `None` results for the user interface, and
//! connects to the configured remote lazily through a [`RemoteConnector`].

use crate::config::VcsConfig;
use crate::engine::{MergeOutcome, VcsListener, VersionControl, VCS_NODE};
use crate::error::VcsError;
use crate::remote::{guard, Remote, RemoteError};
use crate::revision::RevisionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stave_delta::items::PROJECT_INFO_NODE;
use stave_delta::{DocumentNode, ItemId, ProjectTree};
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const REMOTE_PROPERTY: &str = "remote";

/// Where a remote lives, as understood by a [`RemoteConnector`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteLocator(String);

impl RemoteLocator {
    /// Wrap a locator string
    #[inline]
    #[must_use]
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// Locator text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteLocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opens remotes by locator
#[async_trait]
pub trait RemoteConnector: Send + Sync + Debug {
    /// Connect to the remote at `locator`
    ///
    /// # Errors
    /// Returns error if the remote cannot be reached
    async fn connect(&self, locator: &RemoteLocator) -> Result<Arc<dyn Remote>, RemoteError>;
}

/// Result of the stash toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StashToggle {
    /// Dirty fields moved into the slot
    Stashed(usize),
    /// Slot re-applied; fields that changed
    Unstashed(usize),
    /// Clean tree and empty slot
    Nothing,
}

/// Version control attached to one project
pub struct VersionControlNode {
    engine: VersionControl,
    connector: Arc<dyn RemoteConnector>,
    locator: Option<RemoteLocator>,
    remote: Option<Arc<dyn Remote>>,
    listeners: Vec<Arc<dyn VcsListener>>,
}

impl VersionControlNode {
    /// Create a node with empty history
    #[must_use]
    pub fn new(config: VcsConfig, connector: Arc<dyn RemoteConnector>) -> Self {
        Self {
            engine: VersionControl::new(config),
            connector,
            locator: None,
            remote: None,
            listeners: Vec::new(),
        }
    }

    /// Create a node whose root revision is the tree's current state
    ///
    /// # Errors
    /// Returns error if the root revision cannot be recorded
    pub fn init(
        tree: &dyn ProjectTree,
        config: VcsConfig,
        connector: Arc<dyn RemoteConnector>,
    ) -> Result<Self, VcsError> {
        let mut node = Self::new(config, connector);
        node.engine = VersionControl::init(tree, node.engine.config().clone())?;
        Ok(node)
    }

    /// Underlying engine
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &VersionControl {
        &self.engine
    }

    /// Underlying engine, mutably
    #[inline]
    pub fn engine_mut(&mut self) -> &mut VersionControl {
        &mut self.engine
    }

    /// Configured remote, if any
    #[inline]
    #[must_use]
    pub fn remote_locator(&self) -> Option<&RemoteLocator> {
        self.locator.as_ref()
    }

    /// Point the node at another remote; the next remote request reconnects
    pub fn set_remote(&mut self, locator: RemoteLocator) {
        if self.locator.as_ref() != Some(&locator) {
            self.remote = None;
            self.locator = Some(locator);
        }
    }

    /// Subscribe to engine events; survives a clone
    pub fn subscribe(&mut self, listener: Arc<dyn VcsListener>) {
        self.engine.subscribe(Arc::clone(&listener));
        self.listeners.push(listener);
    }

    /// Commit every changed item
    ///
    /// Returns `None` when there was nothing to commit.
    ///
    /// # Errors
    /// Returns error if the revision cannot be recorded
    pub fn request_commit(
        &mut self,
        tree: &dyn ProjectTree,
        message: &str,
    ) -> Result<Option<RevisionId>, VcsError> {
        let author = self.engine.config().default_author.clone();
        noop_as_none(self.engine.commit(tree, message, &author))
    }

    /// Commit only the project info item
    ///
    /// # Errors
    /// Returns error if the revision cannot be recorded
    pub fn commit_project_info(
        &mut self,
        tree: &dyn ProjectTree,
        message: &str,
    ) -> Result<Option<RevisionId>, VcsError> {
        let ids: Vec<ItemId> = tree
            .tracked_items()
            .into_iter()
            .filter(|item| item.item_type() == PROJECT_INFO_NODE)
            .map(|item| item.vcs_id())
            .collect();
        let author = self.engine.config().default_author.clone();
        noop_as_none(self.engine.commit_items(tree, &ids, message, &author))
    }

    /// Check out a revision
    ///
    /// # Errors
    /// Returns [`VcsError::UnknownRevision`] if `id` is not in history
    pub fn request_checkout(
        &mut self,
        tree: &mut dyn ProjectTree,
        id: RevisionId,
    ) -> Result<usize, VcsError> {
        self.engine.checkout(tree, id)
    }

    /// Stash when there is something to stash, otherwise re-apply the stash
    ///
    /// Edits to items head does not record cannot be stashed and do not
    /// block re-applying a filled slot.
    ///
    /// # Errors
    /// Returns error if stashing or re-applying fails
    pub fn request_stash_toggle(&mut self, tree: &mut dyn ProjectTree) -> Result<StashToggle, VcsError> {
        if self.engine.stashable(tree) > 0 {
            return self.engine.stash(tree).map(StashToggle::Stashed);
        }
        match self.engine.unstash(tree) {
            Ok(changed) => Ok(StashToggle::Unstashed(changed)),
            Err(VcsError::NothingStashed) => Ok(StashToggle::Nothing),
            Err(err) => Err(err),
        }
    }

    /// Replace local state with a clone of the remote at `locator`
    ///
    /// # Errors
    /// Returns remote or cancellation errors; local state is unchanged
    pub async fn request_clone(
        &mut self,
        tree: &mut dyn ProjectTree,
        locator: RemoteLocator,
        cancel: &CancellationToken,
    ) -> Result<RevisionId, VcsError> {
        let remote = guard(
            cancel,
            self.engine.config().remote_timeout(),
            self.connector.connect(&locator),
        )
        .await?;
        let mut engine =
            VersionControl::clone_from(self.engine.config().clone(), tree, remote.as_ref(), cancel)
                .await?;
        for listener in &self.listeners {
            engine.subscribe(Arc::clone(listener));
        }
        let head = engine.head().ok_or(VcsError::NoHead)?;

        self.engine = engine;
        self.locator = Some(locator);
        self.remote = Some(remote);
        info!(head = %head.short(), "clone finished");
        Ok(head)
    }

    /// Pull from the configured remote
    ///
    /// # Errors
    /// Returns remote, cancellation or merge errors
    pub async fn request_pull(
        &mut self,
        tree: &mut dyn ProjectTree,
        cancel: &CancellationToken,
    ) -> Result<MergeOutcome, VcsError> {
        let remote = self.connected(cancel).await?;
        self.engine.pull(tree, remote.as_ref(), cancel).await
    }

    /// Push to the configured remote
    ///
    /// # Errors
    /// Returns remote, cancellation or rejection errors
    pub async fn request_push(&mut self, cancel: &CancellationToken) -> Result<usize, VcsError> {
        let remote = self.connected(cancel).await?;
        self.engine.push(remote.as_ref(), cancel).await
    }

    /// Short history summary, e.g. `3 revisions, 5 changes`
    #[must_use]
    pub fn stats_string(&self) -> String {
        let history = self.engine.history();
        format!(
            "{} revisions, {} changes",
            history.len(),
            history.total_changes()
        )
    }

    /// Engine state plus the remote locator
    #[must_use]
    pub fn serialize(&self) -> DocumentNode {
        let mut node = self.engine.serialize();
        if let Some(locator) = &self.locator {
            node.set_property(REMOTE_PROPERTY, locator.as_str());
        }
        node
    }

    /// Restore engine state and the remote locator
    ///
    /// # Errors
    /// Returns error if the node is malformed or fails verification
    pub fn deserialize(&mut self, node: &DocumentNode) -> Result<(), VcsError> {
        let node = node.expect_name(VCS_NODE)?;
        self.engine.deserialize(node)?;
        self.locator = node
            .property(REMOTE_PROPERTY)
            .and_then(serde_json::Value::as_str)
            .map(RemoteLocator::new);
        self.remote = None;
        Ok(())
    }

    /// Drop history, stash and remote
    pub fn reset(&mut self) {
        self.engine.reset();
        self.locator = None;
        self.remote = None;
    }

    async fn connected(&mut self, cancel: &CancellationToken) -> Result<Arc<dyn Remote>, VcsError> {
        if let Some(remote) = &self.remote {
            return Ok(Arc::clone(remote));
        }
        let locator = self
            .locator
            .clone()
            .ok_or_else(|| VcsError::RemoteUnavailable("no remote configured".to_string()))?;
        let remote = guard(
            cancel,
            self.engine.config().remote_timeout(),
            self.connector.connect(&locator),
        )
        .await?;
        debug!(%locator, "connected to remote");
        self.remote = Some(Arc::clone(&remote));
        Ok(remote)
    }
}

impl Debug for VersionControlNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionControlNode")
            .field("engine", &self.engine)
            .field("locator", &self.locator)
            .field("connected", &self.remote.is_some())
            .finish_non_exhaustive()
    }
}

fn noop_as_none(result: Result<RevisionId, VcsError>) -> Result<Option<RevisionId>, VcsError> {
    match result {
        Ok(id) => Ok(Some(id)),
        Err(err) if err.is_noop() => Ok(None),
        Err(err) => Err(err),
    }
}
