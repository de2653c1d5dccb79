//! Document persistence of revisions and stashes
//!
//! A revision is written as a `revision` node whose children are the recorded
//! fields, one `delta` node per (item, delta type, payload) triple. Reading
//! recomputes the id and rejects revisions that do not match it.

use crate::error::VcsError;
use crate::revision::{Revision, RevisionId};
use crate::stash::Stash;
use chrono::{DateTime, SecondsFormat, Utc};
use stave_delta::{DocumentNode, FieldDelta, ItemId, ItemSnapshot, DELTA_NODE};
use stave_merge::SnapshotMap;
use std::collections::BTreeMap;

/// Node name of a persisted revision
pub const REVISION_NODE: &str = "revision";

/// Node name of a persisted stash
pub const STASH_NODE: &str = "stash";

const ITEM_PROPERTY: &str = "item";
const ITEM_NAME_PROPERTY: &str = "itemName";
const ITEM_TYPE_PROPERTY: &str = "itemType";

/// Named-node storage the engine persists into
pub trait DocumentStore: Send + Sync {
    /// Read the node stored under `name`
    ///
    /// # Errors
    /// Returns error if the store cannot be read
    fn read_node(&self, name: &str) -> Result<Option<DocumentNode>, VcsError>;

    /// Store `node` under its own name, replacing any previous one
    ///
    /// # Errors
    /// Returns error if the store cannot be written
    fn write_node(&mut self, node: DocumentNode) -> Result<(), VcsError>;
}

/// In-memory [`DocumentStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    nodes: BTreeMap<String, DocumentNode>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if nothing is stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl DocumentStore for MemoryStore {
    fn read_node(&self, name: &str) -> Result<Option<DocumentNode>, VcsError> {
        Ok(self.nodes.get(name).cloned())
    }

    fn write_node(&mut self, node: DocumentNode) -> Result<(), VcsError> {
        self.nodes.insert(node.name().to_string(), node);
        Ok(())
    }
}

/// Write a revision as a document node
#[must_use]
pub fn revision_to_node(revision: &Revision) -> DocumentNode {
    let parents: Vec<String> = revision.parents().iter().map(ToString::to_string).collect();
    let mut node = DocumentNode::new(REVISION_NODE);
    node.set_property("id", revision.id().to_string())
        .set_property("parents", parents)
        .set_property("message", revision.message())
        .set_property("author", revision.author())
        .set_property("timestamp", format_time(revision.timestamp()));
    write_items(&mut node, revision.items());
    node
}

/// Read a revision back and verify its id
///
/// Unknown delta types are kept as recorded.
///
/// # Errors
/// Returns [`VcsError::Document`] for malformed nodes and
/// [`VcsError::IntegrityViolation`] if the content does not match the id
pub fn revision_from_node(node: &DocumentNode) -> Result<Revision, VcsError> {
    let node = node.expect_name(REVISION_NODE)?;
    let stored = parse_revision_id(node, "id", node.str_property("id")?)?;
    let parents = match node.property("parents") {
        None => Vec::new(),
        Some(serde_json::Value::Array(values)) => values
            .iter()
            .map(|v| {
                let text = v
                    .as_str()
                    .ok_or_else(|| node.malformed("parents", "expected revision ids"))?;
                parse_revision_id(node, "parents", text)
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(node.malformed("parents", "expected an array").into()),
    };
    let timestamp = parse_time(node, "timestamp")?;
    let items = read_items(node)?;

    let revision = Revision::new(
        parents,
        node.str_property_or_default("message"),
        node.str_property_or_default("author"),
        timestamp,
        items.into_values(),
    );
    if revision.id() != stored {
        return Err(VcsError::IntegrityViolation(stored));
    }
    Ok(revision)
}

/// Write a stash as a document node
#[must_use]
pub fn stash_to_node(stash: &Stash) -> DocumentNode {
    let mut node = DocumentNode::new(STASH_NODE);
    node.set_property("base", stash.base().to_string())
        .set_property("createdAt", format_time(stash.created_at()));
    write_items(&mut node, stash.changes());
    node
}

/// Read a stash back
///
/// # Errors
/// Returns error if the node is malformed
pub fn stash_from_node(node: &DocumentNode) -> Result<Stash, VcsError> {
    let node = node.expect_name(STASH_NODE)?;
    let base = parse_revision_id(node, "base", node.str_property("base")?)?;
    let created_at = parse_time(node, "createdAt")?;
    Ok(Stash::new(base, created_at, read_items(node)?.into_values()))
}

fn write_items(node: &mut DocumentNode, items: &SnapshotMap) {
    for snap in items.values() {
        for field in snap.fields() {
            let mut child = field.to_node();
            child
                .set_property(ITEM_PROPERTY, snap.id().to_string())
                .set_property(ITEM_NAME_PROPERTY, snap.name())
                .set_property(ITEM_TYPE_PROPERTY, snap.kind());
            node.add_child(child);
        }
    }
}

fn read_items(node: &DocumentNode) -> Result<SnapshotMap, VcsError> {
    let mut items = SnapshotMap::new();
    for child in node.children_named(DELTA_NODE) {
        let id = child
            .str_property(ITEM_PROPERTY)?
            .parse::<ItemId>()
            .map_err(|e| child.malformed(ITEM_PROPERTY, e.to_string()))?;
        let field = FieldDelta::from_node(child)?;
        items
            .entry(id)
            .or_insert_with(|| {
                ItemSnapshot::new(
                    id,
                    child.str_property_or_default(ITEM_NAME_PROPERTY),
                    child.str_property_or_default(ITEM_TYPE_PROPERTY),
                )
            })
            .set_field(field);
    }
    Ok(items)
}

fn parse_revision_id(node: &DocumentNode, property: &str, text: &str) -> Result<RevisionId, VcsError> {
    text.parse::<RevisionId>()
        .map_err(|e| VcsError::from(node.malformed(property, e.to_string())))
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_time(node: &DocumentNode, property: &str) -> Result<DateTime<Utc>, VcsError> {
    let text = node.str_property(property)?;
    DateTime::parse_from_rfc3339(text)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| VcsError::from(node.malformed(property, e.to_string())))
}
