//! Track header item
//!
//! The versioned header of one track: its path, display colour, instrument
//! and mute state.

use crate::delta::{out_of_range_delta, Delta};
use crate::diff_logic::{DeltaKind, DiffLogic, KindDiffLogic};
use crate::document::{DocumentError, DocumentNode};
use crate::payload::{Payload, PayloadError, VALUE_KEY};
use crate::tracked::{
    replace_if_changed, ChangeBroadcaster, ChangeListener, ItemChange, ItemId, TrackedItem,
};
use std::sync::Arc;

/// Node name of a persisted track header
pub const TRACK_NODE: &str = "track";

/// Colour of a freshly created track (0xRRGGBB)
pub const DEFAULT_COLOUR: u32 = 0x00_80_80_80;

static DIFF_LOGIC: KindDiffLogic<TrackDelta> = KindDiffLogic::new();

/// Versioned fields of [`TrackHeader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackDelta {
    Path,
    Colour,
    Instrument,
    Mute,
}

/// Decoded value of one [`TrackDelta`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackValue {
    Path(String),
    Colour(u32),
    Instrument(String),
    Muted(bool),
}

impl DeltaKind for TrackDelta {
    type Value = TrackValue;

    const ITEM_TYPE: &'static str = TRACK_NODE;

    const ALL: &'static [Self] = &[Self::Path, Self::Colour, Self::Instrument, Self::Mute];

    fn tag(self) -> &'static str {
        match self {
            Self::Path => "trackPath",
            Self::Colour => "trackColour",
            Self::Instrument => "trackInstrument",
            Self::Mute => "trackMute",
        }
    }

    fn decode(self, payload: &Payload) -> Result<TrackValue, PayloadError> {
        match self {
            Self::Path => payload.text().map(|s| TrackValue::Path(s.to_owned())),
            Self::Colour => {
                let raw = payload.integer()?;
                u32::try_from(raw)
                    .map(TrackValue::Colour)
                    .map_err(|_| PayloadError::wrong_type(VALUE_KEY, "24-bit colour"))
            }
            Self::Instrument => payload
                .text()
                .map(|s| TrackValue::Instrument(s.to_owned())),
            Self::Mute => payload.flag().map(TrackValue::Muted),
        }
    }
}

/// Header of one track
#[derive(Debug, Clone)]
pub struct TrackHeader {
    id: ItemId,
    path: String,
    colour: u32,
    instrument: String,
    muted: bool,
    deltas: Vec<Delta>,
    broadcaster: ChangeBroadcaster,
}

impl TrackHeader {
    /// New unmuted track with no instrument
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            path: path.into(),
            colour: DEFAULT_COLOUR,
            instrument: String::new(),
            muted: false,
            deltas: TrackDelta::ALL.iter().map(|k| Delta::new(k.delta_type())).collect(),
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

    /// Subscribe to field changes
    #[inline]
    pub fn subscribe(&mut self, listener: Arc<dyn ChangeListener>) {
        self.broadcaster.subscribe(listener);
    }

    /// Track path (also its display name)
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Display colour
    #[inline]
    #[must_use]
    pub fn colour(&self) -> u32 {
        self.colour
    }

    /// Instrument identifier, empty if none
    #[inline]
    #[must_use]
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Mute state
    #[inline]
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Rename; returns true if it changed
    pub fn set_path(&mut self, path: impl Into<String>) -> bool {
        self.apply(TrackValue::Path(path.into()))
    }

    /// Recolour; returns true if it changed
    pub fn set_colour(&mut self, colour: u32) -> bool {
        self.apply(TrackValue::Colour(colour))
    }

    /// Change instrument; returns true if it changed
    pub fn set_instrument(&mut self, instrument: impl Into<String>) -> bool {
        self.apply(TrackValue::Instrument(instrument.into()))
    }

    /// Mute or unmute; returns true if it changed
    pub fn set_muted(&mut self, muted: bool) -> bool {
        self.apply(TrackValue::Muted(muted))
    }

    fn apply(&mut self, value: TrackValue) -> bool {
        let (kind, changed) = match value {
            TrackValue::Path(path) => (TrackDelta::Path, replace_if_changed(&mut self.path, path)),
            TrackValue::Colour(colour) => {
                (TrackDelta::Colour, replace_if_changed(&mut self.colour, colour))
            }
            TrackValue::Instrument(instrument) => (
                TrackDelta::Instrument,
                replace_if_changed(&mut self.instrument, instrument),
            ),
            TrackValue::Muted(muted) => (TrackDelta::Mute, replace_if_changed(&mut self.muted, muted)),
        };
        if changed {
            self.broadcaster
                .broadcast(&ItemChange::new(self.id, kind.delta_type()));
        }
        changed
    }

    fn payload_of(&self, kind: TrackDelta) -> Payload {
        match kind {
            TrackDelta::Path => Payload::from_value(self.path.as_str()),
            TrackDelta::Colour => Payload::from_value(self.colour),
            TrackDelta::Instrument => Payload::from_value(self.instrument.as_str()),
            TrackDelta::Mute => Payload::from_value(self.muted),
        }
    }
}

impl TrackedItem for TrackHeader {
    fn vcs_id(&self) -> ItemId {
        self.id
    }

    fn vcs_name(&self) -> String {
        self.path.clone()
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
        match TrackDelta::ALL.get(index) {
            Some(kind) => self.payload_of(*kind),
            None => out_of_range_delta(index, self.deltas.len()),
        }
    }

    fn diff_logic(&self) -> &dyn DiffLogic {
        &DIFF_LOGIC
    }

    fn reset_state_to(&mut self, other: &dyn TrackedItem) -> usize {
        let mut changed = 0;
        for index in 0..other.num_deltas() {
            let Some(kind) = TrackDelta::from_tag(other.delta(index).delta_type().as_str()) else {
                continue;
            };
            match kind.decode(&other.delta_payload(index)) {
                Ok(value) => changed += usize::from(self.apply(value)),
                Err(err) => tracing::warn!(item = %self.id, delta = kind.tag(), "ignoring payload: {err}"),
            }
        }
        changed
    }

    fn serialize(&self) -> DocumentNode {
        let mut node = DocumentNode::new(TRACK_NODE);
        node.set_property("id", self.id.to_string())
            .set_property(TrackDelta::Path.tag(), self.path.as_str())
            .set_property(TrackDelta::Colour.tag(), self.colour)
            .set_property(TrackDelta::Instrument.tag(), self.instrument.as_str())
            .set_property(TrackDelta::Mute.tag(), self.muted);
        node
    }

    fn deserialize(&mut self, node: &DocumentNode) -> Result<(), DocumentError> {
        let node = node.expect_name(TRACK_NODE)?;
        let id = node
            .str_property("id")?
            .parse()
            .map_err(|e: uuid::Error| node.malformed("id", e.to_string()))?;
        let colour = match node.property(TrackDelta::Colour.tag()) {
            None => DEFAULT_COLOUR,
            Some(value) => value
                .as_u64()
                .and_then(|raw| u32::try_from(raw).ok())
                .ok_or_else(|| node.malformed(TrackDelta::Colour.tag(), "expected a colour"))?,
        };
        let muted = node
            .property(TrackDelta::Mute.tag())
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        self.id = id;
        self.path = node.str_property_or_default(TrackDelta::Path.tag());
        self.colour = colour;
        self.instrument = node.str_property_or_default(TrackDelta::Instrument.tag());
        self.muted = muted;
        self.broadcaster.broadcast(&ItemChange::whole(self.id));
        Ok(())
    }

    fn reset(&mut self) {
        self.path.clear();
        self.colour = DEFAULT_COLOUR;
        self.instrument.clear();
        self.muted = false;
        self.broadcaster.broadcast(&ItemChange::whole(self.id));
    }
}
