// src/hal/protocol.rs
//! Configuration write payload
//!
//! ```text
//! +-------+-------+---------+------+-----------+-------------+-----------------+--------+
//! | 0xBA  | 0xC0  | version | rate | impedance | count u16LE | count x entry   | CRC-32 |
//! +-------+-------+---------+------+-----------+-------------+-----------------+--------+
//! entry: id u16LE | flags (bit0 enabled) | gain code | polarity code
//! ```
//!
//! The CRC-32 (IEEE) covers every preceding byte and is stored little-endian.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::acquisition::channel::ChannelId;
use crate::config::acquisition::{
    AcquisitionSettings, ChannelConfig, GainMode, ImpedanceMode, Polarity, StreamRate,
};
use crate::config::constants::protocol::{
    CONFIG_CRC_LEN, CONFIG_ENTRY_LEN, CONFIG_FORMAT_VERSION, CONFIG_HEADER_LEN, CONFIG_MAGIC,
    FLAG_ENABLED,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("bad magic {0:02X?}")]
    BadMagic([u8; 2]),

    #[error("unsupported payload version {0}")]
    UnsupportedVersion(u8),

    #[error("payload truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("invalid {field} code {code}")]
    InvalidField { field: &'static str, code: u8 },
}

/// Serialize resolved settings into a configuration write payload
pub fn encode_config(settings: &AcquisitionSettings) -> Vec<u8> {
    let count = settings.channels.len();
    let mut payload = Vec::with_capacity(CONFIG_HEADER_LEN + count * CONFIG_ENTRY_LEN + CONFIG_CRC_LEN);

    payload.extend_from_slice(&CONFIG_MAGIC);
    payload.push(CONFIG_FORMAT_VERSION);
    payload.push(settings.stream_rate.code());
    payload.push(settings.impedance_mode.code());
    // Channel ids are u16 and unique, so the count always fits
    payload.extend_from_slice(&(count as u16).to_le_bytes());

    for (ch, cfg) in &settings.channels {
        payload.extend_from_slice(&ch.0.to_le_bytes());
        payload.push(if cfg.enabled { FLAG_ENABLED } else { 0 });
        payload.push(cfg.gain.code());
        payload.push(cfg.bias.code());
    }

    let crc = crc32fast::hash(&payload);
    payload.extend_from_slice(&crc.to_le_bytes());
    payload
}

/// Parse and verify a configuration write payload
pub fn decode_config(payload: &[u8]) -> Result<AcquisitionSettings, ProtocolError> {
    let min_len = CONFIG_HEADER_LEN + CONFIG_CRC_LEN;
    if payload.len() < min_len {
        return Err(ProtocolError::Truncated {
            expected: min_len,
            actual: payload.len(),
        });
    }

    let magic = [payload[0], payload[1]];
    if magic != CONFIG_MAGIC {
        return Err(ProtocolError::BadMagic(magic));
    }
    if payload[2] != CONFIG_FORMAT_VERSION {
        return Err(ProtocolError::UnsupportedVersion(payload[2]));
    }

    let count = u16::from_le_bytes([payload[5], payload[6]]) as usize;
    let expected = CONFIG_HEADER_LEN + count * CONFIG_ENTRY_LEN + CONFIG_CRC_LEN;
    if payload.len() != expected {
        return Err(ProtocolError::Truncated {
            expected,
            actual: payload.len(),
        });
    }

    let (body, crc_bytes) = payload.split_at(expected - CONFIG_CRC_LEN);
    let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(ProtocolError::ChecksumMismatch {
            expected: stored,
            actual: computed,
        });
    }

    let stream_rate = StreamRate::try_from(body[3]).map_err(|_| ProtocolError::InvalidField {
        field: "stream rate",
        code: body[3],
    })?;
    let impedance_mode = ImpedanceMode::try_from(body[4]).map_err(|_| ProtocolError::InvalidField {
        field: "impedance mode",
        code: body[4],
    })?;

    let mut channels = BTreeMap::new();
    for entry in body[CONFIG_HEADER_LEN..].chunks_exact(CONFIG_ENTRY_LEN) {
        let id = ChannelId(u16::from_le_bytes([entry[0], entry[1]]));
        let gain = GainMode::try_from(entry[3]).map_err(|_| ProtocolError::InvalidField {
            field: "gain",
            code: entry[3],
        })?;
        let bias = Polarity::try_from(entry[4]).map_err(|_| ProtocolError::InvalidField {
            field: "polarity",
            code: entry[4],
        })?;
        channels.insert(
            id,
            ChannelConfig {
                enabled: entry[2] & FLAG_ENABLED != 0,
                gain,
                bias,
            },
        );
    }

    Ok(AcquisitionSettings {
        stream_rate,
        impedance_mode,
        channels,
    })
}
