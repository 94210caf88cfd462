// src/config/acquisition.rs
//! Staged acquisition configuration
//!
//! Values set here are local until pushed with `load_config` or at stream
//! start. Every setting remembers whether it was touched since the last reset
//! so untouched settings fall back to the documented defaults when resolved
//! against a device.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::acquisition::channel::{ChannelId, ChannelLayout};
use crate::config::constants::acquisition::{DEFAULT_GAIN, DEFAULT_IMPEDANCE_MODE, DEFAULT_STREAM_RATE};
use crate::error::{EegError, EegResult};
use crate::hal::types::DeviceFeatures;

/// Amplifier gain of an electrode channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GainMode {
    X1 = 0,
    X2 = 1,
    X4 = 2,
    X6 = 3,
    X8 = 4,
    X12 = 5,
    Unknown = 0xFF,
}

impl GainMode {
    pub const VALID: [GainMode; 6] = [
        GainMode::X1,
        GainMode::X2,
        GainMode::X4,
        GainMode::X6,
        GainMode::X8,
        GainMode::X12,
    ];

    /// Integer multiplier, `-1` for [`GainMode::Unknown`]
    pub const fn to_multiplier(self) -> i32 {
        match self {
            GainMode::X1 => 1,
            GainMode::X2 => 2,
            GainMode::X4 => 4,
            GainMode::X6 => 6,
            GainMode::X8 => 8,
            GainMode::X12 => 12,
            GainMode::Unknown => -1,
        }
    }

    /// Mode for an integer multiplier; anything outside the six valid values is `Unknown`
    pub const fn from_multiplier(multiplier: i32) -> GainMode {
        match multiplier {
            1 => GainMode::X1,
            2 => GainMode::X2,
            4 => GainMode::X4,
            6 => GainMode::X6,
            8 => GainMode::X8,
            12 => GainMode::X12,
            _ => GainMode::Unknown,
        }
    }

    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for GainMode {
    type Error = EegError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(GainMode::X1),
            1 => Ok(GainMode::X2),
            2 => Ok(GainMode::X4),
            3 => Ok(GainMode::X6),
            4 => Ok(GainMode::X8),
            5 => Ok(GainMode::X12),
            0xFF => Ok(GainMode::Unknown),
            other => Err(EegError::invalid_argument("gain", format!("unknown gain code {}", other))),
        }
    }
}

/// Bias (reference) assignment of an electrode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Polarity {
    #[default]
    None = 0,
    Both = 1,
    Positive = 2,
    Negative = 3,
}

impl Polarity {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Polarity {
    type Error = EegError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Polarity::None),
            1 => Ok(Polarity::Both),
            2 => Ok(Polarity::Positive),
            3 => Ok(Polarity::Negative),
            other => Err(EegError::invalid_argument("polarity", format!("unknown polarity code {}", other))),
        }
    }
}

/// Test current used for electrode impedance estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ImpedanceMode {
    #[default]
    Off = 0,
    /// 7.8 Hz wave
    Hz7_8 = 1,
    /// 31.2 Hz wave
    Hz31_2 = 2,
    /// Data rate divided by 4
    DrDiv4 = 3,
}

impl ImpedanceMode {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ImpedanceMode {
    type Error = EegError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ImpedanceMode::Off),
            1 => Ok(ImpedanceMode::Hz7_8),
            2 => Ok(ImpedanceMode::Hz31_2),
            3 => Ok(ImpedanceMode::DrDiv4),
            other => Err(EegError::invalid_argument("impedance_mode", format!("unknown impedance code {}", other))),
        }
    }
}

/// Device data stream rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum StreamRate {
    Hz16000 = 0,
    Hz8000 = 1,
    Hz4000 = 2,
    Hz2000 = 3,
    Hz1000 = 4,
    Hz500 = 5,
    Hz250 = 6,
}

impl StreamRate {
    pub const ALL: [StreamRate; 7] = [
        StreamRate::Hz16000,
        StreamRate::Hz8000,
        StreamRate::Hz4000,
        StreamRate::Hz2000,
        StreamRate::Hz1000,
        StreamRate::Hz500,
        StreamRate::Hz250,
    ];

    pub const fn hz(self) -> u32 {
        match self {
            StreamRate::Hz16000 => 16_000,
            StreamRate::Hz8000 => 8_000,
            StreamRate::Hz4000 => 4_000,
            StreamRate::Hz2000 => 2_000,
            StreamRate::Hz1000 => 1_000,
            StreamRate::Hz500 => 500,
            StreamRate::Hz250 => 250,
        }
    }

    pub fn from_hz(hz: u32) -> Option<StreamRate> {
        Self::ALL.iter().copied().find(|rate| rate.hz() == hz)
    }

    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for StreamRate {
    type Error = EegError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|rate| rate.code() == code)
            .ok_or_else(|| EegError::invalid_argument("stream_rate", format!("unknown rate code {}", code)))
    }
}

impl fmt::Display for StreamRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

/// Per-channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub enabled: bool,
    pub gain: GainMode,
    pub bias: Polarity,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gain: DEFAULT_GAIN,
            bias: Polarity::None,
        }
    }
}

/// Fully resolved configuration for one device, ready to be written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    pub stream_rate: StreamRate,
    pub impedance_mode: ImpedanceMode,
    pub channels: BTreeMap<ChannelId, ChannelConfig>,
}

impl AcquisitionSettings {
    pub fn enabled_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(ch, _)| *ch)
    }

    /// Column layout of chunks produced under these settings
    pub fn layout(&self) -> ChannelLayout {
        ChannelLayout::from_enabled(self.enabled_channels())
    }
}

/// Staged, user-mutable configuration with touched tracking
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    enabled: BTreeMap<ChannelId, bool>,
    gains: BTreeMap<ChannelId, GainMode>,
    bias: BTreeMap<ChannelId, Polarity>,
    impedance_mode: Option<ImpedanceMode>,
    stream_rate: Option<StreamRate>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_channel_enabled(&mut self, ch: ChannelId, enabled: bool) -> EegResult<()> {
        Self::check_channel(ch)?;
        self.enabled.insert(ch, enabled);
        Ok(())
    }

    pub fn set_channel_gain(&mut self, ch: ChannelId, gain: GainMode) -> EegResult<()> {
        Self::check_channel(ch)?;
        if gain == GainMode::Unknown {
            return Err(EegError::WrongValue {
                what: "gain",
                value: gain.to_multiplier().to_string(),
            });
        }
        self.gains.insert(ch, gain);
        Ok(())
    }

    pub fn set_channel_bias(&mut self, ch: ChannelId, polarity: Polarity) -> EegResult<()> {
        Self::check_channel(ch)?;
        self.bias.insert(ch, polarity);
        Ok(())
    }

    pub fn set_impedance_mode(&mut self, mode: ImpedanceMode) {
        self.impedance_mode = Some(mode);
    }

    /// Store a rate; support for the connected model is checked by the caller
    pub fn set_stream_rate(&mut self, rate: StreamRate) {
        self.stream_rate = Some(rate);
    }

    /// Rate the next push would use
    pub fn stream_rate(&self) -> StreamRate {
        self.stream_rate.unwrap_or(DEFAULT_STREAM_RATE)
    }

    pub fn impedance_mode(&self) -> ImpedanceMode {
        self.impedance_mode.unwrap_or(DEFAULT_IMPEDANCE_MODE)
    }

    /// True if any setting was touched since the last reset
    pub fn is_touched(&self) -> bool {
        !self.enabled.is_empty()
            || !self.gains.is_empty()
            || !self.bias.is_empty()
            || self.impedance_mode.is_some()
            || self.stream_rate.is_some()
    }

    /// Forget every touched setting
    pub fn reset(&mut self) {
        debug!("resetting staged acquisition configuration");
        *self = Self::default();
    }

    /// Effective configuration of one channel
    pub fn channel_config(&self, ch: ChannelId) -> ChannelConfig {
        let defaults = ChannelConfig::default();
        ChannelConfig {
            enabled: self.enabled.get(&ch).copied().unwrap_or(defaults.enabled),
            gain: self.gains.get(&ch).copied().unwrap_or(defaults.gain),
            bias: self.bias.get(&ch).copied().unwrap_or(defaults.bias),
        }
    }

    /// Resolve staged values against a device, filling untouched settings with defaults.
    ///
    /// Settings staged for channels the device does not have are ignored. Fails
    /// when the effective stream rate is not supported by the model.
    pub fn resolve(&self, features: &DeviceFeatures) -> EegResult<AcquisitionSettings> {
        let stream_rate = self.stream_rate();
        if !features.supports_rate(stream_rate) {
            return Err(EegError::Unsupported {
                model: features.model,
                what: format!("stream rate {}", stream_rate),
            });
        }

        let device_channels = features.channels();
        for ch in self
            .enabled
            .keys()
            .chain(self.gains.keys())
            .chain(self.bias.keys())
        {
            if device_channels.binary_search(ch).is_err() {
                debug!(channel = %ch, model = ?features.model, "ignoring staged setting for absent channel");
            }
        }

        let channels = device_channels
            .iter()
            .map(|ch| (*ch, self.channel_config(*ch)))
            .collect();

        Ok(AcquisitionSettings {
            stream_rate,
            impedance_mode: self.impedance_mode(),
            channels,
        })
    }

    fn check_channel(ch: ChannelId) -> EegResult<()> {
        if ch.wire_type().is_none() {
            return Err(EegError::invalid_argument("channel", format!("unknown channel id {}", ch.0)));
        }
        Ok(())
    }
}
