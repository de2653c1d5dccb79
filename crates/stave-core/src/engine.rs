//! Version control engine
//!
//! Owns the revision graph, the head pointer, the single stash slot and the
//! remote tracking reference. Live items stay owned by the project tree; the
//! engine only observes them and reconciles them toward recorded snapshots.
//!
//! # States
//! A tree is *clean* when every item matches head, *dirty* once an edit
//! makes some field differ, and clean again after `commit`, `checkout` or
//! `stash`.
//!
//! # Remote operations
//! `fetch`, `pull`, `push` and `clone_from` await the remote first and touch
//! engine or item state only after their last suspension point, so a
//! cancelled or failed call leaves everything unchanged.

use crate::config::{StashPolicy, VcsConfig};
use crate::error::VcsError;
use crate::history::History;
use crate::persistence::{
    revision_from_node, revision_to_node, stash_from_node, stash_to_node, DocumentStore,
    REVISION_NODE, STASH_NODE,
};
use crate::remote::{guard, PushOutcome, Remote};
use crate::revision::{Revision, RevisionId};
use crate::stash::Stash;
use chrono::Utc;
use stave_delta::{DocumentNode, FieldDelta, ItemId, ItemSnapshot, ProjectTree, TrackedItem};
use stave_merge::{FieldConflict, SnapshotMap, ThreeWayMerge};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Node name of persisted engine state
pub const VCS_NODE: &str = "versionControl";

/// Message of the revision `init` records
pub const INITIAL_MESSAGE: &str = "Initial revision";

/// Head, stash or tracking change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsEvent {
    /// Head now points at `to`
    HeadMoved {
        from: Option<RevisionId>,
        to: RevisionId,
    },
    /// Stash slot filled or emptied
    StashChanged { stashed: bool },
    /// Remote tracking reference moved
    TrackingMoved(RevisionId),
}

/// Observer of engine state changes
pub trait VcsListener: Send + Sync {
    /// Called after every head, stash or tracking mutation
    fn vcs_changed(&self, event: &VcsEvent);
}

impl<F> VcsListener for F
where
    F: Fn(&VcsEvent) + Send + Sync,
{
    fn vcs_changed(&self, event: &VcsEvent) {
        self(event);
    }
}

/// Uncommitted changes of one item
#[derive(Debug, Clone, PartialEq)]
pub struct ItemStatus {
    pub id: ItemId,
    pub name: String,
    pub changes: Vec<FieldDelta>,
}

impl ItemStatus {
    /// One human-readable line per changed field
    #[must_use]
    pub fn descriptions(&self) -> Vec<String> {
        self.changes
            .iter()
            .map(|field| {
                let what = field
                    .delta
                    .description()
                    .map_or_else(|| field.delta_type().to_string(), str::to_owned);
                format!("{}: {what} changed", self.name)
            })
            .collect()
    }
}

/// Working tree compared with head
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingState {
    pub head: Option<RevisionId>,
    /// Items with at least one changed field, in tree order
    pub items: Vec<ItemStatus>,
}

impl WorkingState {
    /// True if nothing differs from head
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of changed fields
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.items.iter().map(|item| item.changes.len()).sum()
    }

    /// Status of one item, if it changed
    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&ItemStatus> {
        self.items.iter().find(|item| item.id == id)
    }
}

/// Result of a merge
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Remote head already in local history
    UpToDate,
    /// Head moved forward without a merge revision
    FastForward { head: RevisionId, changed: usize },
    /// Merge revision recorded
    Merged {
        revision: RevisionId,
        conflicts: Vec<FieldConflict>,
        changed: usize,
    },
}

impl MergeOutcome {
    /// Number of item fields the merge changed
    #[must_use]
    pub fn changed(&self) -> usize {
        match self {
            Self::UpToDate => 0,
            Self::FastForward { changed, .. } | Self::Merged { changed, .. } => *changed,
        }
    }
}

/// The revision history engine
pub struct VersionControl {
    config: VcsConfig,
    history: History,
    head: Option<RevisionId>,
    stash: Option<Stash>,
    tracking: Option<RevisionId>,
    listeners: Vec<Arc<dyn VcsListener>>,
}

impl VersionControl {
    /// Create engine with empty history
    #[must_use]
    pub fn new(config: VcsConfig) -> Self {
        Self {
            config,
            history: History::new(),
            head: None,
            stash: None,
            tracking: None,
            listeners: Vec::new(),
        }
    }

    /// Create engine and record the tree's current state as root revision
    ///
    /// # Errors
    /// Returns error if the root revision cannot be recorded
    pub fn init(tree: &dyn ProjectTree, config: VcsConfig) -> Result<Self, VcsError> {
        let mut engine = Self::new(config);
        let author = engine.config.default_author.clone();
        engine.commit(tree, INITIAL_MESSAGE, &author)?;
        Ok(engine)
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &VcsConfig {
        &self.config
    }

    /// Revision graph
    #[inline]
    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Current head
    #[inline]
    #[must_use]
    pub fn head(&self) -> Option<RevisionId> {
        self.head
    }

    /// Stash slot
    #[inline]
    #[must_use]
    pub fn stash_slot(&self) -> Option<&Stash> {
        self.stash.as_ref()
    }

    /// True if the stash slot is occupied
    #[inline]
    #[must_use]
    pub fn has_stash(&self) -> bool {
        self.stash.is_some()
    }

    /// Remote tracking reference
    #[inline]
    #[must_use]
    pub fn tracking(&self) -> Option<RevisionId> {
        self.tracking
    }

    /// Subscribe to head/stash/tracking changes
    pub fn subscribe(&mut self, listener: Arc<dyn VcsListener>) {
        self.listeners.push(listener);
    }

    /// Changed fields of every item relative to head
    #[must_use]
    pub fn status(&self, tree: &dyn ProjectTree) -> WorkingState {
        let items = tree
            .tracked_items()
            .into_iter()
            .filter_map(|item| {
                let changes = self.item_changes(item);
                (!changes.is_empty()).then(|| ItemStatus {
                    id: item.vcs_id(),
                    name: item.vcs_name(),
                    changes,
                })
            })
            .collect();
        WorkingState {
            head: self.head,
            items,
        }
    }

    /// Record every item into a new revision on top of head
    ///
    /// The first commit records a root revision even for an unchanged tree.
    ///
    /// # Errors
    /// Returns [`VcsError::EmptyCommit`] if nothing differs from head
    pub fn commit(
        &mut self,
        tree: &dyn ProjectTree,
        message: &str,
        author: &str,
    ) -> Result<RevisionId, VcsError> {
        if self.head.is_some() && self.status(tree).is_clean() {
            return Err(VcsError::EmptyCommit);
        }
        let items = self.working_items(tree);
        let parents = self.head.into_iter().collect();
        let id = self.record(parents, message, author, items)?;
        info!(revision = %id.short(), message, author, "committed");
        Ok(id)
    }

    /// Record only the chosen items; other items stay dirty
    ///
    /// # Errors
    /// Returns [`VcsError::EmptyCommit`] if none of the chosen items changed
    pub fn commit_items(
        &mut self,
        tree: &dyn ProjectTree,
        ids: &[ItemId],
        message: &str,
        author: &str,
    ) -> Result<RevisionId, VcsError> {
        let mut items = self.head_items();
        let mut changed = 0;
        for id in ids {
            let Some(item) = tree.tracked_item(*id) else {
                warn!(item = %id, "selected item is not in the project tree");
                continue;
            };
            let changes = self.item_changes(item);
            if !changes.is_empty() {
                changed += changes.len();
                items.insert(*id, ItemSnapshot::capture(item));
            }
        }
        if changed == 0 {
            return Err(VcsError::EmptyCommit);
        }

        let parents = self.head.into_iter().collect();
        let id = self.record(parents, message, author, items)?;
        info!(revision = %id.short(), fields = changed, "committed selected items");
        Ok(id)
    }

    /// Bring the whole tree to revision `id` and move head there
    ///
    /// Live items the revision does not record are offered to
    /// [`ProjectTree::remove_item`]. Returns the number of fields that
    /// changed, counting every field of a removed item.
    ///
    /// # Errors
    /// Returns [`VcsError::UnknownRevision`] if `id` is not in history
    pub fn checkout(&mut self, tree: &mut dyn ProjectTree, id: RevisionId) -> Result<usize, VcsError> {
        let target = Arc::clone(self.history.require(id)?);
        let changed = prune(tree, target.items()) + reconcile(tree, target.items());
        self.move_head(id);
        info!(revision = %id.short(), changed, "checked out");
        Ok(changed)
    }

    /// Move dirty changes into the stash slot and revert them
    ///
    /// Returns the number of stashed fields; zero when the tree was clean, or
    /// when the slot was occupied under [`StashPolicy::KeepExisting`] (the
    /// dirty changes are then discarded).
    ///
    /// # Errors
    /// Returns [`VcsError::NoHead`] before the first commit
    pub fn stash(&mut self, tree: &mut dyn ProjectTree) -> Result<usize, VcsError> {
        let head = self.head.ok_or(VcsError::NoHead)?;
        let head_rev = Arc::clone(self.history.require(head)?);

        let dirty = stashable_changes(&head_rev, tree);
        if dirty.is_empty() {
            debug!("nothing to stash");
            return Ok(0);
        }

        let reverted: SnapshotMap = dirty
            .iter()
            .filter_map(|snap| head_rev.item(snap.id()))
            .map(|snap| (snap.id(), snap.clone()))
            .collect();

        if self.stash.is_some() && self.config.stash_policy == StashPolicy::KeepExisting {
            reconcile(tree, &reverted);
            warn!("stash slot occupied; current changes discarded");
            return Ok(0);
        }

        let stash = Stash::new(head, Utc::now(), dirty);
        let count = stash.len();
        reconcile(tree, &reverted);
        let replaced = self.stash.replace(stash).is_some();
        self.emit(&VcsEvent::StashChanged { stashed: true });
        info!(fields = count, replaced, "stashed");
        Ok(count)
    }

    /// Number of fields [`VersionControl::stash`] would move into the slot
    ///
    /// Edits to items head does not record are not stashable, so this can
    /// be zero for a tree that [`VersionControl::status`] reports dirty.
    #[must_use]
    pub fn stashable(&self, tree: &dyn ProjectTree) -> usize {
        self.head
            .and_then(|head| self.history.get(&head))
            .map_or(0, |rev| {
                stashable_changes(rev, tree).iter().map(ItemSnapshot::len).sum()
            })
    }

    /// Re-apply the stashed changes and empty the slot
    ///
    /// # Errors
    /// Returns [`VcsError::NothingStashed`] if the slot is empty, or
    /// [`VcsError::UnknownRevision`] if the stash base left history
    pub fn unstash(&mut self, tree: &mut dyn ProjectTree) -> Result<usize, VcsError> {
        let Some(stash) = self.stash.as_ref() else {
            return Err(VcsError::NothingStashed);
        };
        self.history.require(stash.base())?;
        let changed = reconcile(tree, stash.changes());
        self.stash = None;
        self.emit(&VcsEvent::StashChanged { stashed: false });
        info!(changed, "unstashed");
        Ok(changed)
    }

    /// Three-way merge of `remote_head` into the working tree
    ///
    /// Disjoint field edits combine; same-field conflicts follow the
    /// configured [`stave_merge::ConflictPolicy`]. When local head is the
    /// common ancestor the merge is a fast-forward and no merge revision is
    /// recorded. Uncommitted edits take part as local changes.
    ///
    /// # Errors
    /// Returns [`VcsError::UnknownRevision`] if `remote_head` is not in
    /// history, or [`VcsError::DivergedHistory`] if the heads share no
    /// ancestor
    pub fn merge(
        &mut self,
        tree: &mut dyn ProjectTree,
        remote_head: RevisionId,
    ) -> Result<MergeOutcome, VcsError> {
        let remote = Arc::clone(self.history.require(remote_head)?);
        let Some(local) = self.head else {
            let changed = self.checkout(tree, remote_head)?;
            return Ok(MergeOutcome::FastForward {
                head: remote_head,
                changed,
            });
        };
        if self.history.is_ancestor(remote_head, local) {
            debug!(remote = %remote_head.short(), "already up to date");
            return Ok(MergeOutcome::UpToDate);
        }
        let ancestor = self
            .history
            .common_ancestor(local, remote_head)
            .ok_or(VcsError::DivergedHistory {
                local,
                remote: remote_head,
            })?;

        let policy = self.config.conflict_policy;
        let winner = policy.winner(local != ancestor);
        let base = Arc::clone(self.history.require(ancestor)?);
        let working = self.working_items(tree);
        let result = ThreeWayMerge::new(winner).merge(base.items(), &working, remote.items());
        for conflict in &result.conflicts {
            warn!(
                item = %conflict.item,
                delta = %conflict.delta_type,
                winner = %conflict.winner,
                policy = policy.name(),
                "conflicting edits"
            );
        }

        let changed = reconcile(tree, &result.items);
        if ancestor == local {
            self.move_head(remote_head);
            info!(head = %remote_head.short(), changed, "fast-forward");
            return Ok(MergeOutcome::FastForward {
                head: remote_head,
                changed,
            });
        }

        let message = format!("Merge {} into {}", remote_head.short(), local.short());
        let author = self.config.default_author.clone();
        let revision = self.record(vec![local, remote_head], &message, &author, result.items)?;
        info!(
            revision = %revision.short(),
            changed,
            conflicts = result.conflicts.len(),
            "merged"
        );
        Ok(MergeOutcome::Merged {
            revision,
            conflicts: result.conflicts,
            changed,
        })
    }

    /// First-parent chain from head, newest first
    #[must_use]
    pub fn log(&self) -> Vec<Arc<Revision>> {
        self.head
            .map(|head| self.history.first_parent_chain(head))
            .unwrap_or_default()
    }

    /// Revision by id
    ///
    /// # Errors
    /// Returns [`VcsError::UnknownRevision`] if `id` is not in history
    pub fn revision(&self, id: RevisionId) -> Result<Arc<Revision>, VcsError> {
        self.history.require(id).map(Arc::clone)
    }

    /// Fields revision `id` changed relative to its first parent
    ///
    /// # Errors
    /// Returns [`VcsError::UnknownRevision`] if `id` is not in history
    pub fn changes(&self, id: RevisionId) -> Result<Vec<(ItemId, Vec<FieldDelta>)>, VcsError> {
        let rev = self.history.require(id)?;
        let parent = rev.first_parent().and_then(|p| self.history.get(&p));
        Ok(rev.changes_since(parent.map(Arc::as_ref)))
    }

    /// True if `ancestor` is reachable from `descendant`
    #[must_use]
    pub fn is_ancestor(&self, ancestor: RevisionId, descendant: RevisionId) -> bool {
        self.history.is_ancestor(ancestor, descendant)
    }

    /// Nearest common ancestor of two revisions
    #[must_use]
    pub fn common_ancestor(&self, a: RevisionId, b: RevisionId) -> Option<RevisionId> {
        self.history.common_ancestor(a, b)
    }

    /// Fetch remote history and move the tracking reference
    ///
    /// # Errors
    /// Returns remote, cancellation or verification errors; local state is
    /// unchanged on error
    pub async fn fetch(
        &mut self,
        remote: &dyn Remote,
        cancel: &CancellationToken,
    ) -> Result<Option<RevisionId>, VcsError> {
        let (history, head) = self.fetch_staged(remote, cancel).await?;
        self.history = history;
        if let Some(head) = head {
            self.move_tracking(head);
        }
        Ok(head)
    }

    /// Fetch then merge the remote head
    ///
    /// # Errors
    /// Returns fetch or merge errors; history and tracking are restored if
    /// the merge fails
    pub async fn pull(
        &mut self,
        tree: &mut dyn ProjectTree,
        remote: &dyn Remote,
        cancel: &CancellationToken,
    ) -> Result<MergeOutcome, VcsError> {
        let (staged, head) = self.fetch_staged(remote, cancel).await?;
        let Some(head) = head else {
            return Ok(MergeOutcome::UpToDate);
        };

        let previous = std::mem::replace(&mut self.history, staged);
        match self.merge(tree, head) {
            Ok(outcome) => {
                self.move_tracking(head);
                Ok(outcome)
            }
            Err(err) => {
                self.history = previous;
                Err(err)
            }
        }
    }

    /// Send revisions between the tracking reference and head, oldest first
    ///
    /// Returns the number of revisions sent.
    ///
    /// # Errors
    /// Returns [`VcsError::PushRejected`] if the remote refuses a revision;
    /// the tracking reference does not move
    pub async fn push(&mut self, remote: &dyn Remote, cancel: &CancellationToken) -> Result<usize, VcsError> {
        let head = self.head.ok_or(VcsError::NoHead)?;
        let pending = self.history.between(self.tracking, head);
        let limit = self.config.remote_timeout();
        for revision in &pending {
            match guard(cancel, limit, remote.push_revision(revision)).await? {
                PushOutcome::Accepted => {}
                PushOutcome::Rejected(reason) => {
                    warn!(revision = %revision.id().short(), %reason, "push rejected");
                    return Err(VcsError::PushRejected(reason));
                }
            }
        }
        if !pending.is_empty() {
            self.move_tracking(head);
        }
        info!(sent = pending.len(), "pushed");
        Ok(pending.len())
    }

    /// Build an engine from a remote and check its head out into `tree`
    ///
    /// Every live item is reset first, so the tree ends up equal to the
    /// remote head.
    ///
    /// # Errors
    /// Returns remote, cancellation or verification errors; `tree` is
    /// untouched on error
    pub async fn clone_from(
        config: VcsConfig,
        tree: &mut dyn ProjectTree,
        remote: &dyn Remote,
        cancel: &CancellationToken,
    ) -> Result<Self, VcsError> {
        let mut engine = Self::new(config);
        let (history, head) = engine.fetch_staged(remote, cancel).await?;
        let head =
            head.ok_or_else(|| VcsError::RemoteUnavailable("remote has no revisions".to_string()))?;
        engine.history = history;

        for id in tree.item_ids() {
            if let Some(item) = tree.tracked_item_mut(id) {
                item.reset();
            }
        }
        engine.checkout(tree, head)?;
        engine.tracking = Some(head);
        info!(head = %head.short(), revisions = engine.history.len(), "cloned");
        Ok(engine)
    }

    /// Whole engine state as a document node
    #[must_use]
    pub fn serialize(&self) -> DocumentNode {
        let mut node = DocumentNode::new(VCS_NODE);
        if let Some(head) = self.head {
            node.set_property("head", head.to_string());
        }
        if let Some(tracking) = self.tracking {
            node.set_property("tracking", tracking.to_string());
        }
        for revision in self.history.iter() {
            node.add_child(revision_to_node(revision));
        }
        if let Some(stash) = &self.stash {
            node.add_child(stash_to_node(stash));
        }
        node
    }

    /// Replace engine state from a document node
    ///
    /// Every revision is verified against its id. Item state is not touched.
    ///
    /// # Errors
    /// Returns error if the node is malformed, a revision fails
    /// verification, or a reference points outside the stored history
    pub fn deserialize(&mut self, node: &DocumentNode) -> Result<(), VcsError> {
        let node = node.expect_name(VCS_NODE)?;
        let mut history = History::new();
        for child in node.children_named(REVISION_NODE) {
            history.insert(revision_from_node(child)?)?;
        }
        let head = read_reference(node, "head", &history)?;
        let tracking = read_reference(node, "tracking", &history)?;
        let stash = node.child(STASH_NODE).map(stash_from_node).transpose()?;
        if let Some(stash) = &stash {
            history.require(stash.base())?;
        }

        self.history = history;
        self.head = head;
        self.tracking = tracking;
        self.stash = stash;
        debug!(revisions = self.history.len(), "engine state restored");
        Ok(())
    }

    /// Drop all history, stash and references
    pub fn reset(&mut self) {
        self.history = History::new();
        self.head = None;
        self.stash = None;
        self.tracking = None;
    }

    /// Persist into a document store
    ///
    /// # Errors
    /// Returns error if the store cannot be written
    pub fn save(&self, store: &mut dyn DocumentStore) -> Result<(), VcsError> {
        store.write_node(self.serialize())
    }

    /// Restore from a document store; returns false if nothing was stored
    ///
    /// # Errors
    /// Returns error if the stored state cannot be read
    pub fn load(&mut self, store: &dyn DocumentStore) -> Result<bool, VcsError> {
        match store.read_node(VCS_NODE)? {
            Some(node) => self.deserialize(&node).map(|()| true),
            None => Ok(false),
        }
    }

    fn head_items(&self) -> SnapshotMap {
        self.head
            .and_then(|head| self.history.get(&head))
            .map(|rev| rev.items().clone())
            .unwrap_or_default()
    }

    /// Head items overlaid with the live state of every tree item
    fn working_items(&self, tree: &dyn ProjectTree) -> SnapshotMap {
        let mut items = self.head_items();
        for item in tree.tracked_items() {
            items.insert(item.vcs_id(), ItemSnapshot::capture(item));
        }
        items
    }

    fn item_changes(&self, item: &dyn TrackedItem) -> Vec<FieldDelta> {
        let recorded = self
            .head
            .and_then(|head| self.history.get(&head))
            .and_then(|rev| rev.item(item.vcs_id()));
        match recorded {
            Some(base) => item.diff_logic().create_diff(base, item),
            None => {
                let empty = ItemSnapshot::new(item.vcs_id(), item.vcs_name(), item.item_type());
                item.diff_logic().create_diff(&empty, item)
            }
        }
    }

    fn record(
        &mut self,
        parents: Vec<RevisionId>,
        message: &str,
        author: &str,
        items: SnapshotMap,
    ) -> Result<RevisionId, VcsError> {
        let revision = Revision::new(parents, message, author, Utc::now(), items.into_values());
        let id = self.history.insert(revision)?.id();
        self.move_head(id);
        Ok(id)
    }

    async fn fetch_staged(
        &self,
        remote: &dyn Remote,
        cancel: &CancellationToken,
    ) -> Result<(History, Option<RevisionId>), VcsError> {
        let fetched = guard(cancel, self.config.remote_timeout(), remote.fetch_remote_head()).await?;

        let mut staged = self.history.clone();
        for revision in fetched.revisions {
            if !revision.verify() {
                return Err(VcsError::IntegrityViolation(revision.id()));
            }
            staged.insert(revision)?;
        }
        if let Some(head) = fetched.head {
            staged.require(head)?;
        }
        debug!(revisions = staged.len(), "fetched");
        Ok((staged, fetched.head))
    }

    fn move_head(&mut self, to: RevisionId) {
        let from = self.head.replace(to);
        if from != Some(to) {
            self.emit(&VcsEvent::HeadMoved { from, to });
        }
    }

    fn move_tracking(&mut self, to: RevisionId) {
        if self.tracking.replace(to) != Some(to) {
            self.emit(&VcsEvent::TrackingMoved(to));
        }
    }

    fn emit(&self, event: &VcsEvent) {
        for listener in &self.listeners {
            listener.vcs_changed(event);
        }
    }
}

impl Debug for VersionControl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionControl")
            .field("head", &self.head)
            .field("revisions", &self.history.len())
            .field("stash", &self.stash.as_ref().map(Stash::len))
            .field("tracking", &self.tracking)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

/// Changed fields of every item head records, one snapshot per dirty item
fn stashable_changes(head: &Revision, tree: &dyn ProjectTree) -> Vec<ItemSnapshot> {
    tree.tracked_items()
        .into_iter()
        .filter_map(|item| {
            let Some(base) = head.item(item.vcs_id()) else {
                debug!(item = %item.vcs_id(), "item unknown to head is not stashed");
                return None;
            };
            let changes = item.diff_logic().create_diff(base, item);
            (!changes.is_empty()).then(|| {
                ItemSnapshot::new(item.vcs_id(), item.vcs_name(), item.item_type())
                    .with_fields(changes)
            })
        })
        .collect()
}

/// Drop live items that `items` does not record
///
/// Returns the number of fields the removed items carried.
fn prune(tree: &mut dyn ProjectTree, items: &SnapshotMap) -> usize {
    let mut removed = 0;
    for id in tree.item_ids() {
        if items.contains_key(&id) {
            continue;
        }
        let fields = tree.tracked_item(id).map_or(0, |item| item.num_deltas());
        if tree.remove_item(id) {
            debug!(item = %id, fields, "removed");
            removed += fields;
        } else {
            warn!(item = %id, "project tree kept item missing from revision");
        }
    }
    removed
}

/// Reconcile live items toward recorded snapshots
///
/// Snapshots of items the tree does not hold are offered to
/// [`ProjectTree::create_item`]; live items without a snapshot are left
/// alone. Returns the number of fields that changed.
fn reconcile(tree: &mut dyn ProjectTree, items: &SnapshotMap) -> usize {
    let mut changed = 0;
    for (id, snap) in items {
        let item = if tree.tracked_item(*id).is_some() {
            tree.tracked_item_mut(*id)
        } else {
            tree.create_item(snap)
        };
        match item {
            Some(item) => {
                let n = item.reset_state_to(snap);
                debug!(item = %id, changed = n, "reconciled");
                changed += n;
            }
            None => warn!(item = %id, name = snap.name(), "skipping item missing from project tree"),
        }
    }
    changed
}

fn read_reference(
    node: &DocumentNode,
    property: &str,
    history: &History,
) -> Result<Option<RevisionId>, VcsError> {
    let Some(text) = node.property(property).and_then(serde_json::Value::as_str) else {
        return Ok(None);
    };
    let id = text
        .parse::<RevisionId>()
        .map_err(|e| VcsError::from(node.malformed(property, e.to_string())))?;
    history.require(id)?;
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stave_delta::items::ProjectMetadata;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tree {
        meta: ProjectMetadata,
    }

    impl ProjectTree for Tree {
        fn tracked_items(&self) -> Vec<&dyn TrackedItem> {
            vec![&self.meta]
        }

        fn tracked_item_mut(&mut self, id: ItemId) -> Option<&mut dyn TrackedItem> {
            if self.meta.vcs_id() == id {
                return Some(&mut self.meta);
            }
            None
        }
    }

    fn setup() -> (Tree, VersionControl) {
        let tree = Tree {
            meta: ProjectMetadata::new("Song", "Alice"),
        };
        let engine = VersionControl::init(&tree, VcsConfig::new()).unwrap();
        (tree, engine)
    }

    #[test]
    fn init_records_root_revision() {
        let (tree, engine) = setup();
        assert_eq!(engine.history().len(), 1);
        assert!(engine.status(&tree).is_clean());
        assert_eq!(engine.log()[0].message(), INITIAL_MESSAGE);
    }

    #[test]
    fn status_lists_changed_fields() {
        let (mut tree, engine) = setup();
        tree.meta.set_author("Bob");
        let state = engine.status(&tree);
        assert_eq!(state.change_count(), 1);
        assert_eq!(
            state.items[0].descriptions(),
            vec!["Project info: projectAuthor changed".to_string()]
        );
    }

    #[test]
    fn commit_on_clean_tree_is_empty() {
        let (tree, mut engine) = setup();
        let err = engine.commit(&tree, "noop", "Alice").unwrap_err();
        assert!(err.is_noop());
    }

    #[test]
    fn listeners_see_head_moves() {
        let (mut tree, mut engine) = setup();
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&hits);
        engine.subscribe(Arc::new(move |event: &VcsEvent| {
            if matches!(event, VcsEvent::HeadMoved { .. }) {
                sink.fetch_add(1, Ordering::SeqCst);
            }
        }));

        tree.meta.set_title("Other");
        engine.commit(&tree, "retitle", "Alice").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn changes_of_revision() {
        let (mut tree, mut engine) = setup();
        tree.meta.set_license("MIT");
        let id = engine.commit(&tree, "relicense", "Alice").unwrap();
        let changes = engine.changes(id).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].1[0].delta_type().as_str(), "projectLicense");
    }

    #[test]
    fn unknown_revision_checkout_fails() {
        let (mut tree, mut engine) = setup();
        let err = engine.checkout(&mut tree, RevisionId::new([9; 32])).unwrap_err();
        assert!(matches!(err, VcsError::UnknownRevision(_)));
    }

    #[test]
    fn unstash_without_stash() {
        let (mut tree, mut engine) = setup();
        assert!(matches!(
            engine.unstash(&mut tree),
            Err(VcsError::NothingStashed)
        ));
    }
}
