//! Persisted document nodes
//!
//! The persistence layer exchanges [`DocumentNode`]s: a named node with a bag
//! of properties and an ordered list of children. Reading and writing the
//! actual file is someone else's job.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named node of a hierarchical document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    name: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    properties: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<DocumentNode>,
}

impl DocumentNode {
    /// Create empty node
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Map::new(),
            children: Vec::new(),
        }
    }

    /// Node name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check node name
    #[inline]
    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.name == name
    }

    /// Set a property, replacing any previous value
    #[inline]
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Builder-style property setter
    #[inline]
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_property(key, value);
        self
    }

    /// Raw property lookup
    #[inline]
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// All properties
    #[inline]
    #[must_use]
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Required string property
    ///
    /// # Errors
    /// Returns error if the property is missing or not a string
    pub fn str_property(&self, key: &str) -> Result<&str, DocumentError> {
        self.required(key)?
            .as_str()
            .ok_or_else(|| self.malformed(key, "expected a string"))
    }

    /// Optional string property, empty if absent
    #[must_use]
    pub fn str_property_or_default(&self, key: &str) -> String {
        self.property(key)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_default()
    }

    /// Required integer property
    ///
    /// # Errors
    /// Returns error if the property is missing or not an integer
    pub fn i64_property(&self, key: &str) -> Result<i64, DocumentError> {
        self.required(key)?
            .as_i64()
            .ok_or_else(|| self.malformed(key, "expected an integer"))
    }

    /// Append a child node
    #[inline]
    pub fn add_child(&mut self, child: DocumentNode) -> &mut Self {
        self.children.push(child);
        self
    }

    /// Builder-style child append
    #[inline]
    #[must_use]
    pub fn with_child(mut self, child: DocumentNode) -> Self {
        self.children.push(child);
        self
    }

    /// Children in document order
    #[inline]
    #[must_use]
    pub fn children(&self) -> &[DocumentNode] {
        &self.children
    }

    /// First child with the given name
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&DocumentNode> {
        self.children.iter().find(|c| c.has_name(name))
    }

    /// All children with the given name, in order
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DocumentNode> + 'a {
        self.children.iter().filter(move |c| c.has_name(name))
    }

    /// Check the node name, or fail with [`DocumentError::UnexpectedNode`]
    ///
    /// # Errors
    /// Returns error if the node is named differently
    pub fn expect_name(&self, expected: &str) -> Result<&Self, DocumentError> {
        if self.has_name(expected) {
            Ok(self)
        } else {
            Err(DocumentError::UnexpectedNode {
                expected: expected.to_string(),
                found: self.name.clone(),
            })
        }
    }

    /// Encode as pretty JSON
    ///
    /// # Errors
    /// Returns error if encoding fails
    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode from JSON
    ///
    /// # Errors
    /// Returns error if the text is not a valid document
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Error for a property with the wrong shape
    #[must_use]
    pub fn malformed(&self, property: &str, reason: impl Into<String>) -> DocumentError {
        DocumentError::MalformedProperty {
            node: self.name.clone(),
            property: property.to_string(),
            reason: reason.into(),
        }
    }

    fn required(&self, key: &str) -> Result<&Value, DocumentError> {
        self.properties
            .get(key)
            .ok_or_else(|| DocumentError::MissingProperty {
                node: self.name.clone(),
                property: key.to_string(),
            })
    }
}

/// Errors while reading a persisted document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Node has an unexpected name
    #[error("expected node '{expected}', found '{found}'")]
    UnexpectedNode { expected: String, found: String },

    /// Required property absent
    #[error("node '{node}' is missing property '{property}'")]
    MissingProperty { node: String, property: String },

    /// Property present but unusable
    #[error("node '{node}' has malformed property '{property}': {reason}")]
    MalformedProperty {
        node: String,
        property: String,
        reason: String,
    },

    /// Encoding failure
    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_and_children() {
        let node = DocumentNode::new("revision")
            .with_property("message", "first")
            .with_property("timestamp", 17)
            .with_child(DocumentNode::new("delta").with_property("type", "a"))
            .with_child(DocumentNode::new("delta").with_property("type", "b"))
            .with_child(DocumentNode::new("stash"));

        assert_eq!(node.str_property("message").unwrap(), "first");
        assert_eq!(node.i64_property("timestamp").unwrap(), 17);
        assert_eq!(node.children_named("delta").count(), 2);
        assert!(node.child("stash").is_some());
        assert!(node.child("missing").is_none());
    }

    #[test]
    fn missing_and_malformed_properties() {
        let node = DocumentNode::new("n").with_property("count", "three");
        assert!(matches!(
            node.str_property("absent"),
            Err(DocumentError::MissingProperty { .. })
        ));
        assert!(matches!(
            node.i64_property("count"),
            Err(DocumentError::MalformedProperty { .. })
        ));
        assert_eq!(node.str_property_or_default("absent"), "");
    }

    #[test]
    fn expect_name_checks() {
        let node = DocumentNode::new("projectInfo");
        assert!(node.expect_name("projectInfo").is_ok());
        assert!(matches!(
            node.expect_name("track"),
            Err(DocumentError::UnexpectedNode { .. })
        ));
    }

    #[test]
    fn json_encoding_round_trips() {
        let node = DocumentNode::new("root")
            .with_property("k", "v")
            .with_child(DocumentNode::new("leaf"));
        let json = node.to_json().unwrap();
        assert_eq!(DocumentNode::from_json(&json).unwrap(), node);
        assert!(DocumentNode::from_json("not json").is_err());
    }
}
