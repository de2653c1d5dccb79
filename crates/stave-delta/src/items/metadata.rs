//! Project metadata item
//!
//! Versions the project's license, title, author and description. The start
//! timestamp is persisted but not versioned.

use crate::delta::{out_of_range_delta, Delta};
use crate::diff_logic::{DeltaKind, DiffLogic, KindDiffLogic};
use crate::document::{DocumentError, DocumentNode};
use crate::payload::{Payload, PayloadError};
use crate::tracked::{
    replace_if_changed, ChangeBroadcaster, ChangeListener, ItemChange, ItemId, TrackedItem,
};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// Node name of persisted project metadata
pub const PROJECT_INFO_NODE: &str = "projectInfo";

/// License every new project starts with
pub const DEFAULT_LICENSE: &str = "Copyright";

const TIMESTAMP_PROPERTY: &str = "projectTimeStamp";

static DIFF_LOGIC: KindDiffLogic<ProjectMetadataDelta> = KindDiffLogic::new();

/// Versioned fields of [`ProjectMetadata`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectMetadataDelta {
    License,
    Title,
    Author,
    Description,
}

impl DeltaKind for ProjectMetadataDelta {
    type Value = String;

    const ITEM_TYPE: &'static str = PROJECT_INFO_NODE;

    const ALL: &'static [Self] = &[Self::License, Self::Title, Self::Author, Self::Description];

    fn tag(self) -> &'static str {
        match self {
            Self::License => "projectLicense",
            Self::Title => "projectTitle",
            Self::Author => "projectAuthor",
            Self::Description => "projectDescription",
        }
    }

    fn decode(self, payload: &Payload) -> Result<String, PayloadError> {
        payload.text().map(str::to_owned)
    }
}

/// Project-wide metadata
#[derive(Debug, Clone)]
pub struct ProjectMetadata {
    id: ItemId,
    start_timestamp: DateTime<Utc>,
    license: String,
    title: String,
    author: String,
    description: String,
    deltas: Vec<Delta>,
    broadcaster: ChangeBroadcaster,
}

impl ProjectMetadata {
    /// New metadata with the default license and an empty description
    #[must_use]
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            start_timestamp: Utc::now(),
            license: DEFAULT_LICENSE.to_string(),
            title: title.into(),
            author: author.into(),
            description: String::new(),
            deltas: Self::initial_deltas(),
            broadcaster: ChangeBroadcaster::new(),
        }
    }

    /// Adopt an existing identity
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: ItemId) -> Self {
        self.id = id;
        self
    }

    fn initial_deltas() -> Vec<Delta> {
        ProjectMetadataDelta::ALL
            .iter()
            .map(|kind| match kind {
                ProjectMetadataDelta::Description => {
                    Delta::new(kind.delta_type()).with_description("initialized")
                }
                _ => Delta::new(kind.delta_type()),
            })
            .collect()
    }

    /// Subscribe to field changes
    #[inline]
    pub fn subscribe(&mut self, listener: Arc<dyn ChangeListener>) {
        self.broadcaster.subscribe(listener);
    }

    /// Creation time of the project
    #[inline]
    #[must_use]
    pub fn start_timestamp(&self) -> DateTime<Utc> {
        self.start_timestamp
    }

    /// Current license
    #[inline]
    #[must_use]
    pub fn license(&self) -> &str {
        &self.license
    }

    /// Current title
    #[inline]
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Current author
    #[inline]
    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Current description
    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Set license; returns true if it changed
    pub fn set_license(&mut self, value: impl Into<String>) -> bool {
        self.assign(ProjectMetadataDelta::License, value.into())
    }

    /// Set title; returns true if it changed
    pub fn set_title(&mut self, value: impl Into<String>) -> bool {
        self.assign(ProjectMetadataDelta::Title, value.into())
    }

    /// Set author; returns true if it changed
    pub fn set_author(&mut self, value: impl Into<String>) -> bool {
        self.assign(ProjectMetadataDelta::Author, value.into())
    }

    /// Set description; returns true if it changed
    pub fn set_description(&mut self, value: impl Into<String>) -> bool {
        self.assign(ProjectMetadataDelta::Description, value.into())
    }

    fn field(&self, kind: ProjectMetadataDelta) -> &str {
        match kind {
            ProjectMetadataDelta::License => &self.license,
            ProjectMetadataDelta::Title => &self.title,
            ProjectMetadataDelta::Author => &self.author,
            ProjectMetadataDelta::Description => &self.description,
        }
    }

    fn field_mut(&mut self, kind: ProjectMetadataDelta) -> &mut String {
        match kind {
            ProjectMetadataDelta::License => &mut self.license,
            ProjectMetadataDelta::Title => &mut self.title,
            ProjectMetadataDelta::Author => &mut self.author,
            ProjectMetadataDelta::Description => &mut self.description,
        }
    }

    fn assign(&mut self, kind: ProjectMetadataDelta, value: String) -> bool {
        let changed = replace_if_changed(self.field_mut(kind), value);
        if changed {
            self.broadcaster
                .broadcast(&ItemChange::new(self.id, kind.delta_type()));
        }
        changed
    }

    fn kind_at(&self, index: usize) -> ProjectMetadataDelta {
        match ProjectMetadataDelta::ALL.get(index) {
            Some(kind) => *kind,
            None => out_of_range_delta(index, self.deltas.len()),
        }
    }
}

impl TrackedItem for ProjectMetadata {
    fn vcs_id(&self) -> ItemId {
        self.id
    }

    fn vcs_name(&self) -> String {
        "Project info".to_string()
    }

    fn num_deltas(&self) -> usize {
        self.deltas.len()
    }

    fn delta(&self, index: usize) -> &Delta {
        match self.deltas.get(index) {
            Some(delta) => delta,
            None => out_of_range_delta(index, self.deltas.len()),
        }
    }

    fn delta_payload(&self, index: usize) -> Payload {
        Payload::from_value(self.field(self.kind_at(index)))
    }

    fn diff_logic(&self) -> &dyn DiffLogic {
        &DIFF_LOGIC
    }

    fn reset_state_to(&mut self, other: &dyn TrackedItem) -> usize {
        let mut changed = 0;
        for index in 0..other.num_deltas() {
            let Some(kind) = ProjectMetadataDelta::from_tag(other.delta(index).delta_type().as_str())
            else {
                continue;
            };
            match kind.decode(&other.delta_payload(index)) {
                Ok(value) => changed += usize::from(self.assign(kind, value)),
                Err(err) => tracing::warn!(item = %self.id, delta = kind.tag(), "ignoring payload: {err}"),
            }
        }
        changed
    }

    fn serialize(&self) -> DocumentNode {
        let mut node = DocumentNode::new(PROJECT_INFO_NODE);
        node.set_property("id", self.id.to_string())
            .set_property(TIMESTAMP_PROPERTY, self.start_timestamp.timestamp_millis());
        for kind in ProjectMetadataDelta::ALL {
            node.set_property(kind.tag(), self.field(*kind));
        }
        node
    }

    fn deserialize(&mut self, node: &DocumentNode) -> Result<(), DocumentError> {
        self.clear();
        let loaded = self.load(node);
        self.broadcaster.broadcast(&ItemChange::whole(self.id));
        loaded
    }

    fn reset(&mut self) {
        self.clear();
        self.broadcaster.broadcast(&ItemChange::whole(self.id));
    }
}

impl ProjectMetadata {
    fn clear(&mut self) {
        self.start_timestamp = DateTime::<Utc>::UNIX_EPOCH;
        self.license.clear();
        self.title.clear();
        self.author.clear();
        self.description.clear();
        self.deltas = Self::initial_deltas();
    }

    fn load(&mut self, node: &DocumentNode) -> Result<(), DocumentError> {
        let root = if node.has_name(PROJECT_INFO_NODE) {
            node
        } else {
            match node.child(PROJECT_INFO_NODE) {
                Some(child) => child,
                None => return Ok(()),
            }
        };

        if let Some(id) = root.property("id").and_then(|v| v.as_str()) {
            self.id = id
                .parse()
                .map_err(|e: uuid::Error| root.malformed("id", e.to_string()))?;
        }
        if let Some(millis) = root.property(TIMESTAMP_PROPERTY).and_then(serde_json::Value::as_i64) {
            self.start_timestamp = Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| root.malformed(TIMESTAMP_PROPERTY, "timestamp out of range"))?;
        }
        for kind in ProjectMetadataDelta::ALL {
            *self.field_mut(*kind) = root.str_property_or_default(kind.tag());
        }
        Ok(())
    }
}
