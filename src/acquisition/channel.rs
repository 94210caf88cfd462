// src/acquisition/channel.rs
//! Channel registry: stable channel ids, their wire types and chunk layout
//!
//! Channel ids form a flat `u16` space. Per-electrode families occupy a
//! contiguous range starting at their base id, so electrode `i` of a family is
//! addressed as `base + i`:
//!
//! | Family | Base id | Wire type |
//! |---|---|---|
//! | sample number | 0 | `u64` |
//! | electrode measurement | 1 | `f64` (µV) |
//! | electrode contact P | 513 | `bool` |
//! | electrode contact | 1025 | `bool` |
//! | electrode contact N | 1537 | `bool` |
//! | digital input | 2049 | `bool` |
//! | gyroscope | 2497 | `f32` |
//! | accelerometer | 2561 | `f32` |
//! | streaming flag | 2625 | `bool` |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw channel id constants
pub mod ids {
    pub const SAMPLE_NUMBER: u16 = 0;
    pub const ELECTRODE_MEASUREMENT: u16 = 1;
    pub const ELECTRODE_CONTACT_P: u16 = 513;
    pub const ELECTRODE_CONTACT: u16 = 1025;
    pub const ELECTRODE_CONTACT_N: u16 = 1537;
    pub const DIGITAL_INPUT: u16 = 2049;
    pub const GYROSCOPE: u16 = 2497;
    pub const ACCELEROMETER: u16 = 2561;
    pub const STREAMING: u16 = 2625;
}

/// Element type of a channel on the wire and in chunk columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireType {
    /// Unsigned 64-bit integer (sample counter)
    Unsigned,
    /// IEEE-754 double (electrode measurement)
    Double,
    /// One byte, non-zero is true
    Bool,
    /// IEEE-754 single (motion sensors)
    Float,
}

impl WireType {
    /// Bytes one value occupies in a sample frame
    pub const fn byte_width(self) -> usize {
        match self {
            WireType::Unsigned => 8,
            WireType::Double => 8,
            WireType::Bool => 1,
            WireType::Float => 4,
        }
    }
}

/// Channel families of the id space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelFamily {
    SampleNumber,
    ElectrodeMeasurement,
    ElectrodeContactP,
    ElectrodeContact,
    ElectrodeContactN,
    DigitalInput,
    Gyroscope,
    Accelerometer,
    Streaming,
}

impl ChannelFamily {
    const ALL: [ChannelFamily; 9] = [
        ChannelFamily::SampleNumber,
        ChannelFamily::ElectrodeMeasurement,
        ChannelFamily::ElectrodeContactP,
        ChannelFamily::ElectrodeContact,
        ChannelFamily::ElectrodeContactN,
        ChannelFamily::DigitalInput,
        ChannelFamily::Gyroscope,
        ChannelFamily::Accelerometer,
        ChannelFamily::Streaming,
    ];

    /// First id of the family
    pub const fn base(self) -> u16 {
        match self {
            ChannelFamily::SampleNumber => ids::SAMPLE_NUMBER,
            ChannelFamily::ElectrodeMeasurement => ids::ELECTRODE_MEASUREMENT,
            ChannelFamily::ElectrodeContactP => ids::ELECTRODE_CONTACT_P,
            ChannelFamily::ElectrodeContact => ids::ELECTRODE_CONTACT,
            ChannelFamily::ElectrodeContactN => ids::ELECTRODE_CONTACT_N,
            ChannelFamily::DigitalInput => ids::DIGITAL_INPUT,
            ChannelFamily::Gyroscope => ids::GYROSCOPE,
            ChannelFamily::Accelerometer => ids::ACCELEROMETER,
            ChannelFamily::Streaming => ids::STREAMING,
        }
    }

    /// Number of ids reserved for the family
    pub const fn span(self) -> u16 {
        match self {
            ChannelFamily::SampleNumber => 1,
            ChannelFamily::ElectrodeMeasurement => ids::ELECTRODE_CONTACT_P - ids::ELECTRODE_MEASUREMENT,
            ChannelFamily::ElectrodeContactP => ids::ELECTRODE_CONTACT - ids::ELECTRODE_CONTACT_P,
            ChannelFamily::ElectrodeContact => ids::ELECTRODE_CONTACT_N - ids::ELECTRODE_CONTACT,
            ChannelFamily::ElectrodeContactN => ids::DIGITAL_INPUT - ids::ELECTRODE_CONTACT_N,
            ChannelFamily::DigitalInput => ids::GYROSCOPE - ids::DIGITAL_INPUT,
            ChannelFamily::Gyroscope => ids::ACCELEROMETER - ids::GYROSCOPE,
            ChannelFamily::Accelerometer => ids::STREAMING - ids::ACCELEROMETER,
            ChannelFamily::Streaming => 1,
        }
    }

    pub const fn wire_type(self) -> WireType {
        match self {
            ChannelFamily::SampleNumber => WireType::Unsigned,
            ChannelFamily::ElectrodeMeasurement => WireType::Double,
            ChannelFamily::ElectrodeContactP
            | ChannelFamily::ElectrodeContact
            | ChannelFamily::ElectrodeContactN
            | ChannelFamily::DigitalInput
            | ChannelFamily::Streaming => WireType::Bool,
            ChannelFamily::Gyroscope | ChannelFamily::Accelerometer => WireType::Float,
        }
    }
}

/// Stable numeric channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u16);

impl ChannelId {
    pub const SAMPLE_NUMBER: ChannelId = ChannelId(ids::SAMPLE_NUMBER);
    pub const STREAMING: ChannelId = ChannelId(ids::STREAMING);

    /// Channel `index` of `family`, or `None` when the index is outside the family range
    pub fn of(family: ChannelFamily, index: u16) -> Option<ChannelId> {
        if index >= family.span() {
            return None;
        }
        Some(ChannelId(family.base() + index))
    }

    /// Measurement channel of electrode `index`.
    ///
    /// Panics if `index` is outside the electrode range; use [`ChannelId::of`]
    /// for fallible construction.
    pub const fn electrode(index: u16) -> ChannelId {
        assert!(index < ids::ELECTRODE_CONTACT_P - ids::ELECTRODE_MEASUREMENT);
        ChannelId(ids::ELECTRODE_MEASUREMENT + index)
    }

    pub const fn contact(index: u16) -> ChannelId {
        assert!(index < ids::ELECTRODE_CONTACT_N - ids::ELECTRODE_CONTACT);
        ChannelId(ids::ELECTRODE_CONTACT + index)
    }

    pub const fn contact_p(index: u16) -> ChannelId {
        assert!(index < ids::ELECTRODE_CONTACT - ids::ELECTRODE_CONTACT_P);
        ChannelId(ids::ELECTRODE_CONTACT_P + index)
    }

    pub const fn contact_n(index: u16) -> ChannelId {
        assert!(index < ids::DIGITAL_INPUT - ids::ELECTRODE_CONTACT_N);
        ChannelId(ids::ELECTRODE_CONTACT_N + index)
    }

    pub const fn digital_input(index: u16) -> ChannelId {
        assert!(index < ids::GYROSCOPE - ids::DIGITAL_INPUT);
        ChannelId(ids::DIGITAL_INPUT + index)
    }

    pub const fn gyroscope(axis: u16) -> ChannelId {
        assert!(axis < ids::ACCELEROMETER - ids::GYROSCOPE);
        ChannelId(ids::GYROSCOPE + axis)
    }

    pub const fn accelerometer(axis: u16) -> ChannelId {
        assert!(axis < ids::STREAMING - ids::ACCELEROMETER);
        ChannelId(ids::ACCELEROMETER + axis)
    }

    /// Family and index within the family, `None` for ids past the streaming flag
    pub fn family(self) -> Option<(ChannelFamily, u16)> {
        ChannelFamily::ALL.iter().rev().find_map(|family| {
            let base = family.base();
            if self.0 >= base && self.0 - base < family.span() {
                Some((*family, self.0 - base))
            } else {
                None
            }
        })
    }

    pub fn wire_type(self) -> Option<WireType> {
        self.family().map(|(family, _)| family.wire_type())
    }

    pub fn is_electrode_measurement(self) -> bool {
        matches!(self.family(), Some((ChannelFamily::ElectrodeMeasurement, _)))
    }
}

impl From<u16> for ChannelId {
    fn from(raw: u16) -> Self {
        ChannelId(raw)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family() {
            Some((ChannelFamily::SampleNumber, _)) => write!(f, "sample_number"),
            Some((ChannelFamily::Streaming, _)) => write!(f, "streaming"),
            Some((family, index)) => write!(f, "{:?}[{}]", family, index),
            None => write!(f, "channel#{}", self.0),
        }
    }
}

/// Ordered set of enabled channels for one streaming session.
///
/// Columns of an assembled chunk follow ascending channel id, so the index of
/// a channel is its rank among the enabled ids. Channels without a known
/// wire type are never part of a layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    channels: Vec<ChannelId>,
    types: Vec<WireType>,
    offsets: Vec<usize>,
    frame_len: usize,
}

impl ChannelLayout {
    /// Build the layout from any set of enabled ids; duplicates and unknown ids are dropped
    pub fn from_enabled<I>(enabled: I) -> Self
    where
        I: IntoIterator<Item = ChannelId>,
    {
        let mut channels: Vec<ChannelId> = enabled
            .into_iter()
            .filter(|ch| ch.wire_type().is_some())
            .collect();
        channels.sort_unstable();
        channels.dedup();

        let mut types = Vec::with_capacity(channels.len());
        let mut offsets = Vec::with_capacity(channels.len());
        let mut frame_len = 0;
        for ch in &channels {
            let wire = ch.wire_type().unwrap_or(WireType::Bool);
            offsets.push(frame_len);
            frame_len += wire.byte_width();
            types.push(wire);
        }

        Self {
            channels,
            types,
            offsets,
            frame_len,
        }
    }

    /// Column index of `ch`, `None` when it is not enabled
    pub fn index_of(&self, ch: ChannelId) -> Option<usize> {
        self.channels.binary_search(&ch).ok()
    }

    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    pub fn wire_types(&self) -> &[WireType] {
        &self.types
    }

    /// Byte offset of column `index` inside one sample frame
    pub fn offset(&self, index: usize) -> Option<usize> {
        self.offsets.get(index).copied()
    }

    /// Bytes per sample frame
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Iterator over `(channel, wire type, offset)`
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, WireType, usize)> + '_ {
        self.channels
            .iter()
            .zip(self.types.iter())
            .zip(self.offsets.iter())
            .map(|((ch, ty), off)| (*ch, *ty, *off))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_family_lookup() {
        assert_eq!(ChannelId(0).family(), Some((ChannelFamily::SampleNumber, 0)));
        assert_eq!(ChannelId(1).family(), Some((ChannelFamily::ElectrodeMeasurement, 0)));
        assert_eq!(ChannelId(512).family(), Some((ChannelFamily::ElectrodeMeasurement, 511)));
        assert_eq!(ChannelId(513).family(), Some((ChannelFamily::ElectrodeContactP, 0)));
        assert_eq!(ChannelId(1027).family(), Some((ChannelFamily::ElectrodeContact, 2)));
        assert_eq!(ChannelId(2499).family(), Some((ChannelFamily::Gyroscope, 2)));
        assert_eq!(ChannelId(2561).family(), Some((ChannelFamily::Accelerometer, 0)));
        assert_eq!(ChannelId(2625).family(), Some((ChannelFamily::Streaming, 0)));
        assert_eq!(ChannelId(2626).family(), None);
    }

    #[test]
    fn test_wire_types() {
        assert_eq!(ChannelId::SAMPLE_NUMBER.wire_type(), Some(WireType::Unsigned));
        assert_eq!(ChannelId::electrode(3).wire_type(), Some(WireType::Double));
        assert_eq!(ChannelId::contact_n(0).wire_type(), Some(WireType::Bool));
        assert_eq!(ChannelId::digital_input(0).wire_type(), Some(WireType::Bool));
        assert_eq!(ChannelId::accelerometer(1).wire_type(), Some(WireType::Float));
        assert_eq!(ChannelId::STREAMING.wire_type(), Some(WireType::Bool));
        assert_eq!(WireType::Unsigned.byte_width(), 8);
        assert_eq!(WireType::Float.byte_width(), 4);
    }

    #[test]
    fn test_checked_constructor() {
        assert_eq!(ChannelId::of(ChannelFamily::ElectrodeMeasurement, 4), Some(ChannelId(5)));
        assert_eq!(ChannelId::of(ChannelFamily::Streaming, 1), None);
        assert_eq!(ChannelId::of(ChannelFamily::SampleNumber, 0), Some(ChannelId::SAMPLE_NUMBER));
    }

    #[test]
    fn test_layout_offsets() {
        let layout = ChannelLayout::from_enabled(vec![
            ChannelId::accelerometer(0),
            ChannelId::electrode(0),
            ChannelId::SAMPLE_NUMBER,
            ChannelId::contact(0),
        ]);

        assert_eq!(
            layout.channels(),
            &[
                ChannelId::SAMPLE_NUMBER,
                ChannelId::electrode(0),
                ChannelId::contact(0),
                ChannelId::accelerometer(0),
            ]
        );
        assert_eq!(layout.offset(0), Some(0));
        assert_eq!(layout.offset(1), Some(8));
        assert_eq!(layout.offset(2), Some(16));
        assert_eq!(layout.offset(3), Some(17));
        assert_eq!(layout.frame_len(), 21);
        assert_eq!(layout.index_of(ChannelId::contact(0)), Some(2));
        assert_eq!(layout.index_of(ChannelId::electrode(1)), None);
    }

    #[test]
    fn test_layout_drops_unknown_and_duplicates() {
        let layout = ChannelLayout::from_enabled(vec![
            ChannelId(9000),
            ChannelId::electrode(1),
            ChannelId::electrode(1),
        ]);
        assert_eq!(layout.len(), 1);
        assert_eq!(layout.frame_len(), 8);
    }

    proptest! {
        #[test]
        fn prop_index_is_contiguous_rank(raw in proptest::collection::btree_set(0u16..=2625, 0..64)) {
            let layout = ChannelLayout::from_enabled(raw.iter().copied().map(ChannelId));
            let mut indices: Vec<usize> = raw
                .iter()
                .map(|r| layout.index_of(ChannelId(*r)).expect("enabled channel has an index"))
                .collect();

            // BTreeSet iterates ascending, so the ranks must come back in order
            prop_assert!(indices.windows(2).all(|w| w[0] < w[1]));
            indices.sort_unstable();
            prop_assert_eq!(indices, (0..raw.len()).collect::<Vec<_>>());
        }
    }
}
