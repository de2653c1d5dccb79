//! Recorded item state
//!
//! An [`ItemSnapshot`] is the frozen delta set of one item. Revisions and
//! stashes store snapshots, and the engine hands them to live items as the
//! transient "other" side of [`TrackedItem::reset_state_to`].

use crate::delta::{out_of_range_delta, Delta, FieldDelta, DELTA_NODE};
use crate::diff_logic::{DiffLogic, PayloadDiffLogic};
use crate::document::{DocumentError, DocumentNode};
use crate::payload::Payload;
use crate::tracked::{ItemId, TrackedItem};
use serde::{Deserialize, Serialize};

/// Node name of a persisted snapshot
pub const SNAPSHOT_NODE: &str = "item";

static SNAPSHOT_LOGIC: PayloadDiffLogic = PayloadDiffLogic;

/// Frozen delta set of one tracked item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    id: ItemId,
    name: String,
    item_type: String,
    fields: Vec<FieldDelta>,
}

impl ItemSnapshot {
    /// Create snapshot with no fields
    #[must_use]
    pub fn new(id: ItemId, name: impl Into<String>, item_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            item_type: item_type.into(),
            fields: Vec::new(),
        }
    }

    /// Replace the field list (later duplicates of a tag win)
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<FieldDelta>) -> Self {
        self.fields.clear();
        for field in fields {
            self.set_field(field);
        }
        self
    }

    /// Record every field of a live item
    #[must_use]
    pub fn capture(item: &dyn TrackedItem) -> Self {
        Self::new(item.vcs_id(), item.vcs_name(), item.item_type()).with_fields(item.field_deltas())
    }

    /// Same identity, no fields
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self::new(self.id, self.name.clone(), self.item_type.clone())
    }

    /// Item identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Item name at capture time
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename (names are not versioned fields)
    #[inline]
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Kind tag
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.item_type
    }

    /// Recorded fields, in order
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[FieldDelta] {
        &self.fields
    }

    /// Field with the given tag
    #[must_use]
    pub fn field(&self, tag: &str) -> Option<&FieldDelta> {
        self.fields.iter().find(|f| f.delta.has_type(tag))
    }

    /// Number of fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no fields are recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Insert or replace one field; report whether the payload changed
    pub fn set_field(&mut self, field: FieldDelta) -> bool {
        match self
            .fields
            .iter_mut()
            .find(|f| f.delta_type() == field.delta_type())
        {
            Some(existing) if existing.payload == field.payload => false,
            Some(existing) => {
                *existing = field;
                true
            }
            None => {
                self.fields.push(field);
                true
            }
        }
    }

    /// Apply fields in order; returns how many changed something
    pub fn apply_fields(&mut self, fields: &[FieldDelta]) -> usize {
        fields
            .iter()
            .filter(|field| self.set_field((*field).clone()))
            .count()
    }

    /// Fields of `self` that differ from `base`
    #[must_use]
    pub fn changes_since(&self, base: &ItemSnapshot) -> Vec<FieldDelta> {
        SNAPSHOT_LOGIC.create_diff(base, self)
    }
}

impl TrackedItem for ItemSnapshot {
    fn vcs_id(&self) -> ItemId {
        self.id
    }

    fn vcs_name(&self) -> String {
        self.name.clone()
    }

    fn num_deltas(&self) -> usize {
        self.fields.len()
    }

    fn delta(&self, index: usize) -> &Delta {
        match self.fields.get(index) {
            Some(field) => &field.delta,
            None => out_of_range_delta(index, self.fields.len()),
        }
    }

    fn delta_payload(&self, index: usize) -> Payload {
        match self.fields.get(index) {
            Some(field) => field.payload.clone(),
            None => out_of_range_delta(index, self.fields.len()),
        }
    }

    fn diff_logic(&self) -> &dyn DiffLogic {
        &SNAPSHOT_LOGIC
    }

    fn reset_state_to(&mut self, other: &dyn TrackedItem) -> usize {
        (0..other.num_deltas())
            .filter(|&i| {
                self.set_field(FieldDelta::new(other.delta(i).clone(), other.delta_payload(i)))
            })
            .count()
    }

    fn serialize(&self) -> DocumentNode {
        let mut node = DocumentNode::new(SNAPSHOT_NODE);
        node.set_property("id", self.id.to_string())
            .set_property("name", self.name.as_str())
            .set_property("type", self.item_type.as_str());
        for field in &self.fields {
            node.add_child(field.to_node());
        }
        node
    }

    fn deserialize(&mut self, node: &DocumentNode) -> Result<(), DocumentError> {
        let node = node.expect_name(SNAPSHOT_NODE)?;
        let id = node
            .str_property("id")?
            .parse()
            .map_err(|e: uuid::Error| node.malformed("id", e.to_string()))?;
        let fields = node
            .children_named(DELTA_NODE)
            .map(FieldDelta::from_node)
            .collect::<Result<Vec<_>, _>>()?;

        *self = Self::new(id, node.str_property_or_default("name"), node.str_property("type")?)
            .with_fields(fields);
        Ok(())
    }

    fn reset(&mut self) {
        self.fields.clear();
    }

    fn item_type(&self) -> &str {
        &self.item_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaType;
    use proptest::prelude::*;

    fn field(tag: &str, value: &str) -> FieldDelta {
        FieldDelta::new(Delta::new(DeltaType::new(tag)), Payload::from_value(value))
    }

    fn snapshot() -> ItemSnapshot {
        ItemSnapshot::new(ItemId::new(), "Project info", "projectInfo")
    }

    #[test]
    fn set_field_replaces_rather_than_appends() {
        let mut snap = snapshot();
        assert!(snap.set_field(field("title", "a")));
        assert!(snap.set_field(field("title", "b")));
        assert!(!snap.set_field(field("title", "b")));
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.field("title").unwrap().payload.text().unwrap(), "b");
    }

    #[test]
    fn item_type_comes_from_snapshot() {
        let snap = snapshot();
        assert_eq!(TrackedItem::item_type(&snap), "projectInfo");
        assert_eq!(snap.kind(), "projectInfo");
    }

    #[test]
    fn changes_since_lists_new_and_changed() {
        let base = snapshot().with_fields(vec![field("a", "1"), field("b", "2")]);
        let next = base
            .clone()
            .with_fields(vec![field("a", "1"), field("b", "3"), field("c", "4")]);
        let tags: Vec<_> = next
            .changes_since(&base)
            .iter()
            .map(|f| f.delta_type().to_string())
            .collect();
        assert_eq!(tags, vec!["b", "c"]);
    }

    #[test]
    fn serialize_round_trip() {
        let snap = snapshot().with_fields(vec![field("a", "1"), field("unknown", "?")]);
        let mut back = snapshot();
        back.deserialize(&TrackedItem::serialize(&snap)).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn deserialize_rejects_wrong_node() {
        let mut snap = snapshot();
        assert!(snap.deserialize(&DocumentNode::new("revision")).is_err());
    }

    #[test]
    #[should_panic(expected = "OutOfRangeDelta")]
    fn delta_out_of_range_fails_fast() {
        let snap = snapshot().with_fields(vec![field("a", "1")]);
        let _ = snap.delta(1);
    }

    #[test]
    fn reset_state_to_is_idempotent() {
        let source = snapshot().with_fields(vec![field("a", "x"), field("b", "y")]);
        let mut target = snapshot().with_fields(vec![field("a", "old")]);
        assert_eq!(target.reset_state_to(&source), 2);
        assert_eq!(target.reset_state_to(&source), 0);
    }

    proptest! {
        #[test]
        fn disjoint_field_sets_commute(
            left in prop::collection::btree_map("[a-f]", "[a-z]{0,6}", 0..5),
            right in prop::collection::btree_map("[g-m]", "[a-z]{0,6}", 0..5),
        ) {
            let d1: Vec<_> = left.iter().map(|(k, v)| field(k, v)).collect();
            let d2: Vec<_> = right.iter().map(|(k, v)| field(k, v)).collect();
            let base = snapshot();

            let mut one = base.clone();
            one.apply_fields(&d1);
            one.apply_fields(&d2);

            let mut two = base;
            two.apply_fields(&d2);
            two.apply_fields(&d1);

            for f in d1.iter().chain(&d2) {
                let tag = f.delta_type().as_str();
                prop_assert_eq!(one.field(tag), two.field(tag));
            }
            prop_assert_eq!(one.len(), two.len());
        }
    }
}
