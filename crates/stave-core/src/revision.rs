//! Revisions and their content-derived identifiers
//!
//! A [`Revision`] is an immutable snapshot of the project tree. Its id is a
//! Blake3 hash over parents, metadata and every recorded field, so a revision
//! read back from storage or received from a remote can be verified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stave_delta::{FieldDelta, ItemId, ItemSnapshot};
use stave_merge::SnapshotMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// 32-byte revision identifier (Blake3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevisionId([u8; 32]);

impl RevisionId {
    /// Create from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from a byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RevisionIdError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| RevisionIdError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Short form (first 12 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl Display for RevisionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for RevisionId {
    type Err = RevisionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl TryFrom<String> for RevisionId {
    type Error = RevisionIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RevisionId> for String {
    fn from(id: RevisionId) -> Self {
        id.to_string()
    }
}

/// Errors parsing a revision id
#[derive(Debug, thiserror::Error)]
pub enum RevisionIdError {
    /// Wrong number of bytes
    #[error("invalid revision id length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Not hex
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

/// Immutable snapshot of the project tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    id: RevisionId,
    parents: Vec<RevisionId>,
    message: String,
    author: String,
    timestamp: DateTime<Utc>,
    items: SnapshotMap,
}

impl Revision {
    /// Create revision; the id is derived from the content
    ///
    /// Snapshots without fields are not recorded.
    #[must_use]
    pub fn new(
        parents: Vec<RevisionId>,
        message: impl Into<String>,
        author: impl Into<String>,
        timestamp: DateTime<Utc>,
        items: impl IntoIterator<Item = ItemSnapshot>,
    ) -> Self {
        let items: SnapshotMap = items
            .into_iter()
            .filter(|snap| !snap.is_empty())
            .map(|snap| (snap.id(), snap))
            .collect();
        let message = message.into();
        let author = author.into();
        let id = compute_id(&parents, &message, &author, &timestamp, &items);
        Self {
            id,
            parents,
            message,
            author,
            timestamp,
            items,
        }
    }

    /// Identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> RevisionId {
        self.id
    }

    /// Parent ids; two for a merge, none for a root
    #[inline]
    #[must_use]
    pub fn parents(&self) -> &[RevisionId] {
        &self.parents
    }

    /// First parent, if any
    #[inline]
    #[must_use]
    pub fn first_parent(&self) -> Option<RevisionId> {
        self.parents.first().copied()
    }

    /// True for merge revisions
    #[inline]
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Commit message
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Author
    #[inline]
    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Commit time
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Recorded item states
    #[inline]
    #[must_use]
    pub fn items(&self) -> &SnapshotMap {
        &self.items
    }

    /// Recorded state of one item
    #[inline]
    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&ItemSnapshot> {
        self.items.get(&id)
    }

    /// Total number of recorded fields
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.items.values().map(ItemSnapshot::len).sum()
    }

    /// Per-item fields that differ from `base`
    ///
    /// Items `base` does not know count as entirely new.
    #[must_use]
    pub fn changes_since(&self, base: Option<&Revision>) -> Vec<(ItemId, Vec<FieldDelta>)> {
        self.items
            .values()
            .filter_map(|snap| {
                let changes = match base.and_then(|b| b.item(snap.id())) {
                    Some(previous) => snap.changes_since(previous),
                    None => snap.fields().to_vec(),
                };
                (!changes.is_empty()).then(|| (snap.id(), changes))
            })
            .collect()
    }

    /// Check the id against the content
    #[must_use]
    pub fn verify(&self) -> bool {
        compute_id(
            &self.parents,
            &self.message,
            &self.author,
            &self.timestamp,
            &self.items,
        ) == self.id
    }
}

fn compute_id(
    parents: &[RevisionId],
    message: &str,
    author: &str,
    timestamp: &DateTime<Utc>,
    items: &SnapshotMap,
) -> RevisionId {
    fn field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }

    let mut hasher = blake3::Hasher::new();
    hasher.update(&(parents.len() as u64).to_le_bytes());
    for parent in parents {
        hasher.update(parent.as_bytes());
    }
    field(&mut hasher, message.as_bytes());
    field(&mut hasher, author.as_bytes());
    hasher.update(&timestamp.timestamp().to_le_bytes());
    hasher.update(&timestamp.timestamp_subsec_nanos().to_le_bytes());

    hasher.update(&(items.len() as u64).to_le_bytes());
    for snap in items.values() {
        hasher.update(snap.id().as_uuid().as_bytes());
        field(&mut hasher, snap.name().as_bytes());
        field(&mut hasher, snap.kind().as_bytes());
        hasher.update(&(snap.len() as u64).to_le_bytes());
        for delta in snap.fields() {
            field(&mut hasher, delta.delta_type().as_str().as_bytes());
            field(&mut hasher, delta.delta.description().unwrap_or_default().as_bytes());
            field(&mut hasher, delta.payload.canonical_string().as_bytes());
        }
    }
    RevisionId::new(*hasher.finalize().as_bytes())
}
