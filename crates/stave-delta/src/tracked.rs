//! Tracked items and the project tree that owns them
//!
//! Any project component that wants versioning implements [`TrackedItem`].
//! The engine only ever observes and reconciles items; the tree owns them.

use crate::delta::{Delta, DeltaType, FieldDelta};
use crate::diff_logic::DiffLogic;
use crate::document::{DocumentError, DocumentNode};
use crate::payload::Payload;
use crate::snapshot::ItemSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Persistent identity of a tracked item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Fresh random identity
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    #[inline]
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Underlying UUID
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for ItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Versionable project component
///
/// # Contract
/// - Exactly one delta per versioned field; edits replace a field's value,
///   they never add deltas.
/// - `delta` and `delta_payload` panic on an out-of-range index.
/// - `reset_state_to` ignores delta types it does not know, and mutates (and
///   notifies) only fields whose incoming value differs from the current one.
pub trait TrackedItem: Send + Sync {
    /// Stable identity
    fn vcs_id(&self) -> ItemId;

    /// Human-readable name
    fn vcs_name(&self) -> String;

    /// Number of versioned fields
    fn num_deltas(&self) -> usize;

    /// Delta descriptor at `index`
    ///
    /// # Panics
    /// If `index >= num_deltas()`.
    fn delta(&self, index: usize) -> &Delta;

    /// Current payload of the delta at `index`
    ///
    /// # Panics
    /// If `index >= num_deltas()`.
    fn delta_payload(&self, index: usize) -> Payload;

    /// Diff logic bound to this item
    fn diff_logic(&self) -> &dyn DiffLogic;

    /// Reconcile toward `other`'s observed state
    ///
    /// Returns the number of fields that actually changed.
    fn reset_state_to(&mut self, other: &dyn TrackedItem) -> usize;

    /// Whole current state as a document node
    fn serialize(&self) -> DocumentNode;

    /// Replace current state from a document node
    ///
    /// # Errors
    /// Returns error if the node cannot be read
    fn deserialize(&mut self, node: &DocumentNode) -> Result<(), DocumentError>;

    /// Back to the empty state
    ///
    /// Listeners get one whole-item notice; [`TrackedItem::deserialize`]
    /// likewise notifies once after loading.
    fn reset(&mut self);

    /// Kind tag, as reported by the bound diff logic
    fn item_type(&self) -> &str {
        self.diff_logic().item_type()
    }

    /// Index of the delta with the given tag
    fn find_delta(&self, tag: &str) -> Option<usize> {
        (0..self.num_deltas()).find(|&i| self.delta(i).has_type(tag))
    }

    /// Every delta paired with its current payload
    fn field_deltas(&self) -> Vec<FieldDelta> {
        (0..self.num_deltas())
            .map(|i| FieldDelta::new(self.delta(i).clone(), self.delta_payload(i)))
            .collect()
    }
}

impl Debug for dyn TrackedItem + '_ {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedItem")
            .field("id", &self.vcs_id())
            .field("name", &self.vcs_name())
            .field("type", &self.item_type())
            .field("deltas", &self.num_deltas())
            .finish()
    }
}

/// The live tree of tracked items
pub trait ProjectTree {
    /// All tracked items, in tree order
    fn tracked_items(&self) -> Vec<&dyn TrackedItem>;

    /// Mutable access to one item
    fn tracked_item_mut(&mut self, id: ItemId) -> Option<&mut dyn TrackedItem>;

    /// Shared access to one item
    fn tracked_item(&self, id: ItemId) -> Option<&dyn TrackedItem> {
        self.tracked_items().into_iter().find(|item| item.vcs_id() == id)
    }

    /// Identities of all tracked items
    fn item_ids(&self) -> Vec<ItemId> {
        self.tracked_items().iter().map(|item| item.vcs_id()).collect()
    }

    /// Host a new item for a recorded snapshot the tree does not hold yet
    ///
    /// The returned item must carry the snapshot's identity; the caller
    /// reconciles its fields afterwards. Trees that cannot host items of the
    /// snapshot's kind return `None`.
    fn create_item(&mut self, snapshot: &ItemSnapshot) -> Option<&mut dyn TrackedItem> {
        let _ = snapshot;
        None
    }

    /// Drop a live item that the target state does not record
    ///
    /// Returns false if the tree keeps the item, e.g. items it cannot
    /// remove.
    fn remove_item(&mut self, id: ItemId) -> bool {
        let _ = id;
        false
    }
}

/// Notification that an item changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChange {
    pub item: ItemId,
    /// Changed field; `None` when the whole item was reset or reloaded
    pub delta_type: Option<DeltaType>,
}

impl ItemChange {
    /// Create change notice for one field
    #[inline]
    #[must_use]
    pub fn new(item: ItemId, delta_type: DeltaType) -> Self {
        Self {
            item,
            delta_type: Some(delta_type),
        }
    }

    /// Create change notice covering every field
    #[inline]
    #[must_use]
    pub fn whole(item: ItemId) -> Self {
        Self {
            item,
            delta_type: None,
        }
    }

    /// True if every field may have changed
    #[inline]
    #[must_use]
    pub fn is_whole(&self) -> bool {
        self.delta_type.is_none()
    }
}

/// Observer of item field changes
pub trait ChangeListener: Send + Sync {
    /// Called once per changed field, or once per reset or reload
    fn item_changed(&self, change: &ItemChange);
}

impl<F> ChangeListener for F
where
    F: Fn(&ItemChange) + Send + Sync,
{
    fn item_changed(&self, change: &ItemChange) {
        self(change);
    }
}

/// Fan-out of change notifications to subscribed listeners
#[derive(Clone, Default)]
pub struct ChangeBroadcaster {
    listeners: Vec<Arc<dyn ChangeListener>>,
}

impl ChangeBroadcaster {
    /// Create broadcaster with no listeners
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener
    #[inline]
    pub fn subscribe(&mut self, listener: Arc<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    /// Notify every listener
    pub fn broadcast(&self, change: &ItemChange) {
        for listener in &self.listeners {
            listener.item_changed(change);
        }
    }

    /// Number of listeners
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Debug for ChangeBroadcaster {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBroadcaster")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Assign `value` to `slot` if it differs; report whether anything changed
#[inline]
pub fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn item_id_parses_and_displays() {
        let id = ItemId::new();
        let parsed: ItemId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<ItemId>().is_err());
    }

    #[test]
    fn item_id_serde_is_plain_uuid() {
        let id = ItemId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn broadcaster_reaches_every_listener() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut broadcaster = ChangeBroadcaster::new();
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            broadcaster.subscribe(Arc::new(move |_: &ItemChange| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }

        broadcaster.broadcast(&ItemChange::new(ItemId::new(), DeltaType::from_static("x")));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(broadcaster.listener_count(), 3);
    }

    #[test]
    fn replace_if_changed_skips_equal_values() {
        let mut slot = String::from("Alice");
        assert!(!replace_if_changed(&mut slot, "Alice".to_string()));
        assert!(replace_if_changed(&mut slot, "Bob".to_string()));
        assert_eq!(slot, "Bob");
    }
}
