// src/acquisition/frame.rs
//! Sample frame codec
//!
//! A sample packet is a concatenation of frames. One frame holds one value
//! per enabled channel, in ascending channel id order, little-endian, each
//! with the width of its wire type.

use thiserror::Error;

use crate::acquisition::channel::{ChannelLayout, WireType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("packet of {len} bytes is not a multiple of the {frame_len}-byte frame")]
    Misaligned { len: usize, frame_len: usize },

    #[error("no channels enabled")]
    EmptyLayout,

    #[error("expected {expected} values per frame, got {actual}")]
    ValueCount { expected: usize, actual: usize },

    #[error("value {index} does not match the channel wire type {expected:?}")]
    TypeMismatch { index: usize, expected: WireType },
}

/// One decoded channel value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Unsigned(u64),
    Double(f64),
    Bool(bool),
    Float(f32),
}

impl SampleValue {
    pub fn wire_type(&self) -> WireType {
        match self {
            SampleValue::Unsigned(_) => WireType::Unsigned,
            SampleValue::Double(_) => WireType::Double,
            SampleValue::Bool(_) => WireType::Bool,
            SampleValue::Float(_) => WireType::Float,
        }
    }

    /// Read a value of type `wire` from the start of `bytes`.
    ///
    /// `bytes` must hold at least `wire.byte_width()` bytes.
    #[inline]
    pub fn read(wire: WireType, bytes: &[u8]) -> SampleValue {
        match wire {
            WireType::Unsigned => SampleValue::Unsigned(u64::from_le_bytes(take(bytes))),
            WireType::Double => SampleValue::Double(f64::from_le_bytes(take(bytes))),
            WireType::Bool => SampleValue::Bool(bytes[0] != 0),
            WireType::Float => SampleValue::Float(f32::from_le_bytes(take(bytes))),
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        match self {
            SampleValue::Unsigned(v) => out.extend_from_slice(&v.to_le_bytes()),
            SampleValue::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
            SampleValue::Bool(v) => out.push(u8::from(*v)),
            SampleValue::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
}

#[inline]
fn take<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[..N]);
    buf
}

/// Number of whole frames in a packet of `len` bytes
pub fn frame_count(layout: &ChannelLayout, len: usize) -> Result<usize, FrameError> {
    let frame_len = layout.frame_len();
    if frame_len == 0 {
        return Err(FrameError::EmptyLayout);
    }
    if len % frame_len != 0 {
        return Err(FrameError::Misaligned { len, frame_len });
    }
    Ok(len / frame_len)
}

/// Append one encoded frame to `out`
pub fn encode_frame(layout: &ChannelLayout, values: &[SampleValue], out: &mut Vec<u8>) -> Result<(), FrameError> {
    if values.len() != layout.len() {
        return Err(FrameError::ValueCount {
            expected: layout.len(),
            actual: values.len(),
        });
    }

    for (index, (value, expected)) in values.iter().zip(layout.wire_types()).enumerate() {
        if value.wire_type() != *expected {
            return Err(FrameError::TypeMismatch {
                index,
                expected: *expected,
            });
        }
    }

    out.reserve(layout.frame_len());
    for value in values {
        value.write(out);
    }
    Ok(())
}

/// Decode every frame of a packet into rows of values
pub fn decode_frames(layout: &ChannelLayout, packet: &[u8]) -> Result<Vec<Vec<SampleValue>>, FrameError> {
    let frames = frame_count(layout, packet.len())?;
    let frame_len = layout.frame_len();

    Ok((0..frames)
        .map(|f| {
            let frame = &packet[f * frame_len..(f + 1) * frame_len];
            layout
                .iter()
                .map(|(_, wire, offset)| SampleValue::read(wire, &frame[offset..]))
                .collect()
        })
        .collect())
}
