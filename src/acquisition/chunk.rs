// src/acquisition/chunk.rs
//! Typed column buffers handed to the chunk consumer

use std::sync::Arc;

use crate::acquisition::channel::{ChannelId, ChannelLayout, WireType};
use crate::acquisition::frame::SampleValue;

/// Values of one channel across the samples of a chunk
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Sample counter
    Unsigned(Vec<u64>),
    /// Electrode measurement in microvolts
    Double(Vec<f64>),
    /// Contact, digital input and streaming flags
    Bool(Vec<bool>),
    /// Gyroscope and accelerometer axes
    Float(Vec<f32>),
}

impl Column {
    pub fn with_capacity(wire: WireType, capacity: usize) -> Self {
        match wire {
            WireType::Unsigned => Column::Unsigned(Vec::with_capacity(capacity)),
            WireType::Double => Column::Double(Vec::with_capacity(capacity)),
            WireType::Bool => Column::Bool(Vec::with_capacity(capacity)),
            WireType::Float => Column::Float(Vec::with_capacity(capacity)),
        }
    }

    pub fn wire_type(&self) -> WireType {
        match self {
            Column::Unsigned(_) => WireType::Unsigned,
            Column::Double(_) => WireType::Double,
            Column::Bool(_) => WireType::Bool,
            Column::Float(_) => WireType::Float,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Unsigned(v) => v.len(),
            Column::Double(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_unsigned(&self) -> Option<&[u64]> {
        match self {
            Column::Unsigned(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<&[f64]> {
        match self {
            Column::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&[bool]> {
        match self {
            Column::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<&[f32]> {
        match self {
            Column::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Value at `index`, if present
    pub fn get(&self, index: usize) -> Option<SampleValue> {
        match self {
            Column::Unsigned(v) => v.get(index).map(|x| SampleValue::Unsigned(*x)),
            Column::Double(v) => v.get(index).map(|x| SampleValue::Double(*x)),
            Column::Bool(v) => v.get(index).map(|x| SampleValue::Bool(*x)),
            Column::Float(v) => v.get(index).map(|x| SampleValue::Float(*x)),
        }
    }

    /// Append the value encoded at the start of `bytes`
    #[inline]
    pub(crate) fn push_wire(&mut self, bytes: &[u8]) {
        let value = SampleValue::read(self.wire_type(), bytes);
        self.push(value);
    }

    #[inline]
    fn push(&mut self, value: SampleValue) {
        match (self, value) {
            (Column::Unsigned(v), SampleValue::Unsigned(x)) => v.push(x),
            (Column::Double(v), SampleValue::Double(x)) => v.push(x),
            (Column::Bool(v), SampleValue::Bool(x)) => v.push(x),
            (Column::Float(v), SampleValue::Float(x)) => v.push(x),
            (column, value) => debug_assert!(
                false,
                "{:?} value pushed into a {:?} column",
                value.wire_type(),
                column.wire_type()
            ),
        }
    }

    pub(crate) fn clear(&mut self) {
        match self {
            Column::Unsigned(v) => v.clear(),
            Column::Double(v) => v.clear(),
            Column::Bool(v) => v.clear(),
            Column::Float(v) => v.clear(),
        }
    }
}

/// One batch of samples, one column per enabled channel in ascending id order.
///
/// Borrowed by the consumer for the duration of the chunk callback only;
/// copy out anything that must outlive it.
#[derive(Debug, Clone)]
pub struct Chunk {
    layout: Arc<ChannelLayout>,
    columns: Vec<Column>,
    len: usize,
}

impl Chunk {
    pub(crate) fn new(layout: Arc<ChannelLayout>, capacity: usize) -> Self {
        let columns = layout
            .wire_types()
            .iter()
            .map(|wire| Column::with_capacity(*wire, capacity))
            .collect();
        Self {
            layout,
            columns,
            len: 0,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column of channel `ch`, `None` when it is not enabled
    pub fn column(&self, ch: ChannelId) -> Option<&Column> {
        self.layout.index_of(ch).and_then(|index| self.columns.get(index))
    }

    pub fn channels(&self) -> &[ChannelId] {
        self.layout.channels()
    }

    /// Samples per column
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append one encoded frame; `frame` must be exactly one frame long
    #[inline]
    pub(crate) fn push_frame(&mut self, frame: &[u8]) {
        for (column, (_, _, offset)) in self.columns.iter_mut().zip(self.layout.iter()) {
            column.push_wire(&frame[offset..]);
        }
        self.len += 1;
    }

    pub(crate) fn clear(&mut self) {
        self.columns.iter_mut().for_each(Column::clear);
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_push_and_lookup() {
        let layout = Arc::new(ChannelLayout::from_enabled(vec![
            ChannelId::SAMPLE_NUMBER,
            ChannelId::gyroscope(0),
        ]));
        let mut chunk = Chunk::new(layout, 4);

        let mut frame = Vec::new();
        frame.extend_from_slice(&3u64.to_le_bytes());
        frame.extend_from_slice(&1.5f32.to_le_bytes());
        chunk.push_frame(&frame);

        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.column(ChannelId::SAMPLE_NUMBER).and_then(Column::as_unsigned), Some(&[3u64][..]));
        assert_eq!(chunk.column(ChannelId::gyroscope(0)).and_then(|c| c.get(0)), Some(SampleValue::Float(1.5)));
        assert!(chunk.column(ChannelId::electrode(0)).is_none());

        chunk.clear();
        assert!(chunk.is_empty());
        assert!(chunk.columns().iter().all(Column::is_empty));
    }

    #[test]
    fn test_column_accessors() {
        let column = Column::Bool(vec![true, false]);
        assert_eq!(column.wire_type(), WireType::Bool);
        assert_eq!(column.as_bool(), Some(&[true, false][..]));
        assert!(column.as_double().is_none());
        assert_eq!(column.get(2), None);
    }

    #[test]
    fn test_push_wire_matches_frame_codec() {
        let values = [
            SampleValue::Unsigned(u64::MAX - 7),
            SampleValue::Double(-12.25),
            SampleValue::Bool(true),
            SampleValue::Float(0.5),
        ];
        for value in values {
            let mut bytes = Vec::new();
            value.write(&mut bytes);
            assert_eq!(bytes.len(), value.wire_type().byte_width());

            let mut column = Column::with_capacity(value.wire_type(), 1);
            column.push_wire(&bytes);
            assert_eq!(column.get(0), Some(value));
            assert_eq!(column.get(0), Some(SampleValue::read(value.wire_type(), &bytes)));
        }
    }
}
