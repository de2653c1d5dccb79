//! Testing utilities for the Stave workspace
//!
//! Shared project fixtures, an event recorder and an in-memory remote.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use stave_core::{
    PushOutcome, Remote, RemoteConnector, RemoteError, RemoteHead, RemoteLocator, Revision,
    RevisionId, VcsConfig, VcsEvent, VcsListener, VersionControl,
};
use stave_delta::items::{ProjectMetadata, TrackHeader, PROJECT_INFO_NODE, TRACK_NODE};
use stave_delta::{ChangeListener, ItemChange, ItemId, ItemSnapshot, ProjectTree, TrackedItem};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Project tree holding metadata and a list of tracks
#[derive(Debug, Clone)]
pub struct FixtureProject {
    pub meta: ProjectMetadata,
    pub tracks: Vec<TrackHeader>,
}

impl FixtureProject {
    /// "Song" by "Alice", no tracks
    pub fn new() -> Self {
        Self {
            meta: ProjectMetadata::new("Song", "Alice"),
            tracks: Vec::new(),
        }
    }

    /// Fixture with one track per path
    pub fn with_tracks(paths: &[&str]) -> Self {
        let mut project = Self::new();
        project.tracks = paths.iter().map(|path| TrackHeader::new(*path)).collect();
        project
    }

    /// Fixture with blank metadata, as a freshly opened project would be
    pub fn blank() -> Self {
        Self {
            meta: ProjectMetadata::new("", ""),
            tracks: Vec::new(),
        }
    }

    pub fn track(&self, path: &str) -> Option<&TrackHeader> {
        self.tracks.iter().find(|t| t.path() == path)
    }

    pub fn track_mut(&mut self, path: &str) -> Option<&mut TrackHeader> {
        self.tracks.iter_mut().find(|t| t.path() == path)
    }
}

impl Default for FixtureProject {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectTree for FixtureProject {
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
        match snapshot.kind() {
            PROJECT_INFO_NODE => {
                self.meta = ProjectMetadata::new("", "").with_id(snapshot.id());
                Some(&mut self.meta)
            }
            TRACK_NODE => {
                self.tracks.push(TrackHeader::new("").with_id(snapshot.id()));
                self.tracks.last_mut().map(|t| t as &mut dyn TrackedItem)
            }
            _ => None,
        }
    }

    fn remove_item(&mut self, id: ItemId) -> bool {
        let before = self.tracks.len();
        self.tracks.retain(|t| t.vcs_id() != id);
        self.tracks.len() != before
    }
}

/// Records every engine event and item change notice
#[derive(Debug, Default)]
pub struct CountingListener {
    events: Mutex<Vec<VcsEvent>>,
    item_changes: Mutex<Vec<ItemChange>>,
}

impl CountingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<VcsEvent> {
        self.events.lock().clone()
    }

    pub fn head_moves(&self) -> usize {
        self.count(|e| matches!(e, VcsEvent::HeadMoved { .. }))
    }

    pub fn stash_changes(&self) -> usize {
        self.count(|e| matches!(e, VcsEvent::StashChanged { .. }))
    }

    pub fn tracking_moves(&self) -> usize {
        self.count(|e| matches!(e, VcsEvent::TrackingMoved(_)))
    }

    pub fn item_changes(&self) -> Vec<ItemChange> {
        self.item_changes.lock().clone()
    }

    /// Whole-item notices, as sent by reset and deserialize
    pub fn whole_item_changes(&self) -> usize {
        self.item_changes.lock().iter().filter(|c| c.is_whole()).count()
    }

    fn count(&self, pred: impl Fn(&VcsEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl VcsListener for CountingListener {
    fn vcs_changed(&self, event: &VcsEvent) {
        self.events.lock().push(event.clone());
    }
}

impl ChangeListener for CountingListener {
    fn item_changed(&self, change: &ItemChange) {
        self.item_changes.lock().push(change.clone());
    }
}

#[derive(Debug, Default)]
struct RemoteState {
    revisions: Vec<Revision>,
    head: Option<RevisionId>,
    offline: bool,
    reject: Option<String>,
    delay: Duration,
    pushed: Vec<RevisionId>,
    fetches: usize,
}

/// In-memory [`Remote`] with switchable failure modes
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
}

impl MemoryRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Remote holding a copy of the engine's history and head
    pub fn seeded_from(engine: &VersionControl) -> Arc<Self> {
        let remote = Self::new();
        remote.publish(engine);
        remote
    }

    /// Replace remote content with the engine's history and head
    pub fn publish(&self, engine: &VersionControl) {
        let mut state = self.state.lock();
        state.revisions = engine.history().iter().map(|rev| (**rev).clone()).collect();
        state.head = engine.head();
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn reject_pushes(&self, reason: Option<&str>) {
        self.state.lock().reject = reason.map(str::to_owned);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
    }

    pub fn head(&self) -> Option<RevisionId> {
        self.state.lock().head
    }

    pub fn revision_count(&self) -> usize {
        self.state.lock().revisions.len()
    }

    pub fn pushed(&self) -> Vec<RevisionId> {
        self.state.lock().pushed.clone()
    }

    pub fn fetches(&self) -> usize {
        self.state.lock().fetches
    }

    /// Replace the stored copy of one revision, keeping its position
    pub fn tamper(&self, id: RevisionId, replacement: Revision) {
        let mut state = self.state.lock();
        if let Some(slot) = state.revisions.iter_mut().find(|rev| rev.id() == id) {
            *slot = replacement;
        }
    }

    async fn pause(&self) -> Result<(), RemoteError> {
        let delay = self.state.lock().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.lock().offline {
            return Err(RemoteError::Unavailable("remote is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Remote for MemoryRemote {
    async fn fetch_remote_head(&self) -> Result<RemoteHead, RemoteError> {
        self.pause().await?;
        let mut state = self.state.lock();
        state.fetches += 1;
        Ok(RemoteHead {
            head: state.head,
            revisions: state.revisions.clone(),
        })
    }

    async fn push_revision(&self, revision: &Revision) -> Result<PushOutcome, RemoteError> {
        self.pause().await?;
        let mut state = self.state.lock();
        if let Some(reason) = &state.reject {
            return Ok(PushOutcome::Rejected(reason.clone()));
        }
        if !state.revisions.iter().any(|rev| rev.id() == revision.id()) {
            state.revisions.push(revision.clone());
        }
        state.head = Some(revision.id());
        state.pushed.push(revision.id());
        Ok(PushOutcome::Accepted)
    }
}

/// Connector resolving locators to registered [`MemoryRemote`]s
#[derive(Debug, Default)]
pub struct MemoryConnector {
    remotes: Mutex<HashMap<String, Arc<MemoryRemote>>>,
}

impl MemoryConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, locator: &str, remote: Arc<MemoryRemote>) {
        self.remotes.lock().insert(locator.to_string(), remote);
    }
}

#[async_trait]
impl RemoteConnector for MemoryConnector {
    async fn connect(&self, locator: &RemoteLocator) -> Result<Arc<dyn Remote>, RemoteError> {
        self.remotes
            .lock()
            .get(locator.as_str())
            .map(|remote| Arc::clone(remote) as Arc<dyn Remote>)
            .ok_or_else(|| RemoteError::Unavailable(format!("no remote at {locator}")))
    }
}

/// Engine initialised on `project` with default config
pub fn init_engine(project: &FixtureProject) -> VersionControl {
    VersionControl::init(project, VcsConfig::new()).unwrap()
}
