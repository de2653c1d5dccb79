//! Diff logic strategies
//!
//! Every item kind enumerates its finite set of delta types once, as a
//! [`DeltaKind`] sum type. [`KindDiffLogic`] turns that table into a
//! [`DiffLogic`]: it decodes payloads into typed values before comparing, so
//! malformed or unknown fields are dropped before any comparison happens.

use crate::delta::{DeltaType, FieldDelta};
use crate::payload::{Payload, PayloadError};
use crate::snapshot::ItemSnapshot;
use crate::tracked::TrackedItem;
use std::fmt::Debug;
use std::marker::PhantomData;

/// Item type reported by [`PayloadDiffLogic`]
pub const OPAQUE_ITEM_TYPE: &str = "opaque";

/// Strategy computing and applying deltas for one item kind
pub trait DiffLogic: Send + Sync + Debug {
    /// Kind tag of items this logic understands
    fn item_type(&self) -> &str;

    /// Deltas of `target` whose value differs from `base`
    ///
    /// Applying the result to `base` reproduces `target`'s observable state.
    /// A field `base` lacks counts as different.
    fn create_diff(&self, base: &dyn TrackedItem, target: &dyn TrackedItem) -> Vec<FieldDelta>;

    /// Merge an incoming delta set into `item`, field by field
    ///
    /// Fields whose value already matches are skipped. Returns the number of
    /// fields that changed.
    fn apply_deltas(&self, item: &mut dyn TrackedItem, incoming: &[FieldDelta]) -> usize {
        let view = ItemSnapshot::new(item.vcs_id(), item.vcs_name(), self.item_type())
            .with_fields(incoming.to_vec());
        item.reset_state_to(&view)
    }

    /// Snapshot of `base` with `incoming` applied on top
    fn create_merged_item(&self, base: &dyn TrackedItem, incoming: &[FieldDelta]) -> ItemSnapshot {
        let mut merged = ItemSnapshot::capture(base);
        merged.apply_fields(incoming);
        merged
    }
}

/// Closed table of the delta types one item kind versions
pub trait DeltaKind: Copy + Eq + Debug + Send + Sync + 'static {
    /// Typed value a payload decodes to
    type Value: PartialEq + Debug;

    /// Kind tag shared by every item of this kind
    const ITEM_TYPE: &'static str;

    /// Every delta type of the kind, in canonical order
    const ALL: &'static [Self];

    /// Persisted tag
    fn tag(self) -> &'static str;

    /// Decode and validate a payload for this field
    ///
    /// # Errors
    /// Returns error if the payload does not hold a valid value
    fn decode(self, payload: &Payload) -> Result<Self::Value, PayloadError>;

    /// Look a tag up in the table
    fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.tag() == tag)
    }

    /// Tag as a [`DeltaType`]
    fn delta_type(self) -> DeltaType {
        DeltaType::from_static(self.tag())
    }
}

/// Diff logic driven by a [`DeltaKind`] table
#[derive(Debug)]
pub struct KindDiffLogic<K> {
    _kind: PhantomData<fn() -> K>,
}

impl<K> KindDiffLogic<K> {
    /// Create logic (zero-sized, usable in statics)
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { _kind: PhantomData }
    }
}

impl<K> Default for KindDiffLogic<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: DeltaKind> KindDiffLogic<K> {
    /// Typed value of `kind` in `item`, if present and decodable
    fn current_value(item: &dyn TrackedItem, kind: K) -> Option<K::Value> {
        let index = item.find_delta(kind.tag())?;
        kind.decode(&item.delta_payload(index)).ok()
    }
}

impl<K: DeltaKind> DiffLogic for KindDiffLogic<K> {
    fn item_type(&self) -> &str {
        K::ITEM_TYPE
    }

    fn create_diff(&self, base: &dyn TrackedItem, target: &dyn TrackedItem) -> Vec<FieldDelta> {
        let mut changes = Vec::new();

        for index in 0..target.num_deltas() {
            let delta = target.delta(index);
            let Some(kind) = K::from_tag(delta.delta_type().as_str()) else {
                continue;
            };

            let payload = target.delta_payload(index);
            let incoming = match kind.decode(&payload) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(
                        item = %target.vcs_id(),
                        delta = kind.tag(),
                        "skipping undecodable payload: {err}"
                    );
                    continue;
                }
            };

            if Self::current_value(base, kind).as_ref() != Some(&incoming) {
                changes.push(FieldDelta::new(delta.clone(), payload));
            }
        }

        changes
    }
}

/// Diff logic that compares raw payloads
///
/// Used for snapshots whose concrete kind is not known locally. Payloads are
/// written canonically by their owning kind, so equality of the bag is
/// equality of the value.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadDiffLogic;

impl DiffLogic for PayloadDiffLogic {
    fn item_type(&self) -> &str {
        OPAQUE_ITEM_TYPE
    }

    fn create_diff(&self, base: &dyn TrackedItem, target: &dyn TrackedItem) -> Vec<FieldDelta> {
        (0..target.num_deltas())
            .filter_map(|index| {
                let delta = target.delta(index);
                let payload = target.delta_payload(index);
                let unchanged = base
                    .find_delta(delta.delta_type().as_str())
                    .is_some_and(|j| base.delta_payload(j) == payload);
                (!unchanged).then(|| FieldDelta::new(delta.clone(), payload))
            })
            .collect()
    }
}
