//! Schema-less delta payloads
//!
//! A [`Payload`] is the key-value bag carried by every delta. The bag itself
//! has no schema; the diff logic that owns a delta type decodes it into a typed
//! value before comparing anything.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which single-valued payloads store their value
pub const VALUE_KEY: &str = "value";

/// Opaque structured payload of a delta
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Create empty payload
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Payload holding a single value under [`VALUE_KEY`]
    #[must_use]
    pub fn from_value(value: impl Into<Value>) -> Self {
        Self::new().with(VALUE_KEY, value)
    }

    /// Wrap an existing JSON object
    #[inline]
    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Builder-style insert
    #[inline]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert or replace an entry
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Raw entry lookup
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the payload carries nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Underlying map
    #[inline]
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Payload as a JSON value
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Stable textual form used for hashing (keys are sorted)
    #[must_use]
    pub fn canonical_string(&self) -> String {
        self.to_value().to_string()
    }

    /// Single string value
    ///
    /// # Errors
    /// Returns error if the value entry is missing or not a string
    pub fn text(&self) -> Result<&str, PayloadError> {
        self.require(VALUE_KEY)?
            .as_str()
            .ok_or_else(|| PayloadError::wrong_type(VALUE_KEY, "string"))
    }

    /// Single boolean value
    ///
    /// # Errors
    /// Returns error if the value entry is missing or not a boolean
    pub fn flag(&self) -> Result<bool, PayloadError> {
        self.require(VALUE_KEY)?
            .as_bool()
            .ok_or_else(|| PayloadError::wrong_type(VALUE_KEY, "boolean"))
    }

    /// Single integer value
    ///
    /// # Errors
    /// Returns error if the value entry is missing or not an integer
    pub fn integer(&self) -> Result<i64, PayloadError> {
        self.require(VALUE_KEY)?
            .as_i64()
            .ok_or_else(|| PayloadError::wrong_type(VALUE_KEY, "integer"))
    }

    /// Decode one entry into a typed value
    ///
    /// # Errors
    /// Returns error if the entry is missing or does not match `T`
    pub fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<T, PayloadError> {
        let value = self.require(key)?.clone();
        Ok(serde_json::from_value(value)?)
    }

    fn require(&self, key: &str) -> Result<&Value, PayloadError> {
        self.0
            .get(key)
            .ok_or_else(|| PayloadError::MissingKey(key.to_string()))
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Errors raised while decoding a payload into a typed value
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// Required entry absent
    #[error("payload has no '{0}' entry")]
    MissingKey(String),

    /// Entry present with the wrong shape
    #[error("payload entry '{key}' is not a {expected}")]
    WrongType { key: String, expected: &'static str },

    /// Structured decode failed
    #[error("payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

impl PayloadError {
    /// Shorthand for [`PayloadError::WrongType`]
    #[inline]
    #[must_use]
    pub fn wrong_type(key: &str, expected: &'static str) -> Self {
        Self::WrongType {
            key: key.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_value_accessors() {
        assert_eq!(Payload::from_value("Alice").text().unwrap(), "Alice");
        assert!(Payload::from_value(true).flag().unwrap());
        assert_eq!(Payload::from_value(0x00ff_00ff_i64).integer().unwrap(), 0x00ff_00ff);
    }

    #[test]
    fn wrong_shape_is_reported() {
        let payload = Payload::from_value(42);
        assert!(matches!(
            payload.text(),
            Err(PayloadError::WrongType { expected: "string", .. })
        ));
        assert!(matches!(
            Payload::new().flag(),
            Err(PayloadError::MissingKey(key)) if key == VALUE_KEY
        ));
    }

    #[test]
    fn decode_structured_entry() {
        let payload = Payload::new().with("range", json!([1, 4]));
        let range: Vec<u8> = payload.decode("range").unwrap();
        assert_eq!(range, vec![1, 4]);
        assert!(payload.decode::<String>("range").is_err());
    }

    #[test]
    fn canonical_string_is_key_ordered() {
        let a = Payload::new().with("b", 1).with("a", 2);
        let b = Payload::new().with("a", 2).with("b", 1);
        assert_eq!(a.canonical_string(), b.canonical_string());
        assert_eq!(a.canonical_string(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn serde_is_transparent() {
        let payload = Payload::from_value("x");
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"value":"x"}"#);
        let back: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }
}
