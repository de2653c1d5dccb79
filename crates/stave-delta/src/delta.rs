//! Deltas: named, typed units of change
//!
//! A tracked item exposes exactly one [`Delta`] per field it versions. The
//! descriptor is a cheap immutable value; the field's payload travels next to
//! it in a [`FieldDelta`] whenever deltas are recorded or exchanged.

use crate::document::{DocumentError, DocumentNode};
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};

/// Node name used when a field delta is persisted
pub const DELTA_NODE: &str = "delta";

/// Tag naming the field a delta versions
///
/// Unique within one item's delta set. Tags read from documents that no
/// known kind recognizes are kept as-is and ignored on reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeltaType(Cow<'static, str>);

impl DeltaType {
    /// Tag from a static string (no allocation)
    #[inline]
    #[must_use]
    pub const fn from_static(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    /// Tag from an owned string
    #[inline]
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(Cow::Owned(tag.into()))
    }

    /// Tag text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeltaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for DeltaType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for DeltaType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Immutable descriptor of one versioned field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    delta_type: DeltaType,

    /// Human-readable note for commit listings; never compared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl Delta {
    /// Create delta with no description
    #[inline]
    #[must_use]
    pub fn new(delta_type: DeltaType) -> Self {
        Self {
            delta_type,
            description: None,
        }
    }

    /// Attach a description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Field tag
    #[inline]
    #[must_use]
    pub fn delta_type(&self) -> &DeltaType {
        &self.delta_type
    }

    /// Description, if any
    #[inline]
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Tag check
    #[inline]
    #[must_use]
    pub fn has_type(&self, tag: &str) -> bool {
        self.delta_type == *tag
    }
}

/// A delta paired with its payload
///
/// This is the unit stored in snapshots, stashes and revisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub delta: Delta,
    pub payload: Payload,
}

impl FieldDelta {
    /// Pair a delta with its payload
    #[inline]
    #[must_use]
    pub fn new(delta: Delta, payload: Payload) -> Self {
        Self { delta, payload }
    }

    /// Field tag
    #[inline]
    #[must_use]
    pub fn delta_type(&self) -> &DeltaType {
        self.delta.delta_type()
    }

    /// Persist as a `delta` node
    #[must_use]
    pub fn to_node(&self) -> DocumentNode {
        let mut node = DocumentNode::new(DELTA_NODE);
        node.set_property("type", self.delta_type().as_str());
        if let Some(description) = self.delta.description() {
            node.set_property("description", description);
        }
        node.set_property("payload", self.payload.to_value());
        node
    }

    /// Read back a `delta` node
    ///
    /// # Errors
    /// Returns error if the node lacks a type tag or its payload is not an object
    pub fn from_node(node: &DocumentNode) -> Result<Self, DocumentError> {
        let node = node.expect_name(DELTA_NODE)?;
        let mut delta = Delta::new(DeltaType::new(node.str_property("type")?));
        if let Some(description) = node.property("description").and_then(|v| v.as_str()) {
            delta = delta.with_description(description);
        }
        let payload = match node.property("payload") {
            Some(serde_json::Value::Object(map)) => Payload::from_map(map.clone()),
            Some(_) => return Err(node.malformed("payload", "expected an object")),
            None => Payload::new(),
        };
        Ok(Self::new(delta, payload))
    }
}

/// Fail fast on an out-of-range delta index
///
/// Asking an item for a delta it does not have is a contract violation, not
/// a recoverable condition.
///
/// # Panics
/// Always.
#[cold]
#[track_caller]
pub fn out_of_range_delta(index: usize, len: usize) -> ! {
    panic!("OutOfRangeDelta: delta index {index} is out of range for an item with {len} deltas")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_type_compares_with_str() {
        let tag = DeltaType::from_static("projectAuthor");
        assert_eq!(tag, "projectAuthor");
        assert_eq!(tag, DeltaType::new("projectAuthor"));
        assert_eq!(tag.to_string(), "projectAuthor");
    }

    #[test]
    fn delta_description_is_optional() {
        let delta = Delta::new(DeltaType::from_static("trackMute"));
        assert!(delta.description().is_none());
        assert!(delta.has_type("trackMute"));

        let described = delta.with_description("initialized");
        assert_eq!(described.description(), Some("initialized"));
    }

    #[test]
    fn field_delta_node_keeps_unknown_tags() {
        let field = FieldDelta::new(
            Delta::new(DeltaType::new("futureField")).with_description("from a newer build"),
            Payload::from_value(3),
        );
        let back = FieldDelta::from_node(&field.to_node()).unwrap();
        assert_eq!(back, field);
    }

    #[test]
    fn field_delta_node_rejects_bad_payload() {
        let node = DocumentNode::new(DELTA_NODE)
            .with_property("type", "x")
            .with_property("payload", "scalar");
        assert!(matches!(
            FieldDelta::from_node(&node),
            Err(DocumentError::MalformedProperty { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "OutOfRangeDelta")]
    fn out_of_range_panics() {
        out_of_range_delta(5, 4);
    }
}
