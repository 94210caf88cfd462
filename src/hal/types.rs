// src/hal/types.rs
//! Core types describing headsets, their capabilities and telemetry

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::acquisition::channel::{ChannelFamily, ChannelId};
use crate::config::acquisition::StreamRate;
use crate::config::constants::charging;

/// Headset model as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DeviceModel {
    MiniV2 = 0,
    Midi = 1,
    Maxi = 2,
    Emg = 3,
    Halo = 4,
    HaloV2 = 5,
    Unknown = 0xFF,
}

impl DeviceModel {
    pub fn from_code(code: u8) -> DeviceModel {
        match code {
            0 => DeviceModel::MiniV2,
            1 => DeviceModel::Midi,
            2 => DeviceModel::Maxi,
            3 => DeviceModel::Emg,
            4 => DeviceModel::Halo,
            5 => DeviceModel::HaloV2,
            _ => DeviceModel::Unknown,
        }
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn is_supported(self) -> bool {
        self != DeviceModel::Unknown
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceModel::MiniV2 => "BrainAccess MINI v2",
            DeviceModel::Midi => "BrainAccess MIDI",
            DeviceModel::Maxi => "BrainAccess MAXI",
            DeviceModel::Emg => "BrainAccess EMG",
            DeviceModel::Halo => "BrainAccess HALO",
            DeviceModel::HaloV2 => "BrainAccess HALO v2",
            DeviceModel::Unknown => "unknown device",
        };
        f.write_str(name)
    }
}

/// Semantic version triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u8, minor: u8, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Identity of a connected device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: DeviceModel,
    pub hardware_version: Version,
    pub firmware_version: Version,
    pub serial_number: u64,
    /// Samples carried by one radio notification
    pub samples_per_packet: usize,
}

/// Hardware capabilities of a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFeatures {
    pub model: DeviceModel,
    pub electrode_count: u16,
    /// Positive and negative contact channels instead of a combined one
    pub bipolar: bool,
    pub has_gyroscope: bool,
    pub has_accelerometer: bool,
    pub digital_inputs: u16,
    pub supported_rates: Vec<StreamRate>,
}

const MOTION_AXES: u16 = 3;

impl DeviceFeatures {
    pub fn for_model(model: DeviceModel) -> Self {
        let (electrode_count, bipolar, has_gyroscope, digital_inputs, supported_rates) = match model {
            DeviceModel::MiniV2 => (8, false, true, 1, vec![StreamRate::Hz250, StreamRate::Hz500]),
            DeviceModel::Midi => (16, false, false, 1, vec![StreamRate::Hz250]),
            DeviceModel::Maxi => (32, false, false, 1, vec![StreamRate::Hz250]),
            DeviceModel::Emg => (
                8,
                true,
                true,
                0,
                vec![StreamRate::Hz250, StreamRate::Hz500, StreamRate::Hz1000],
            ),
            DeviceModel::Halo | DeviceModel::HaloV2 => {
                (4, false, true, 0, vec![StreamRate::Hz250, StreamRate::Hz500])
            }
            DeviceModel::Unknown => (0, false, false, 0, Vec::new()),
        };

        Self {
            model,
            electrode_count,
            bipolar,
            has_gyroscope,
            has_accelerometer: model.is_supported(),
            digital_inputs,
            supported_rates,
        }
    }

    pub fn supports_rate(&self, rate: StreamRate) -> bool {
        self.supported_rates.contains(&rate)
    }

    /// Every addressable channel of the model, in ascending id order
    pub fn channels(&self) -> Vec<ChannelId> {
        if !self.model.is_supported() {
            return Vec::new();
        }

        let mut channels = vec![ChannelId::SAMPLE_NUMBER];
        let mut family = |family: ChannelFamily, count: u16| {
            channels.extend((0..count).filter_map(|i| ChannelId::of(family, i)));
        };

        family(ChannelFamily::ElectrodeMeasurement, self.electrode_count);
        if self.bipolar {
            family(ChannelFamily::ElectrodeContactP, self.electrode_count);
            family(ChannelFamily::ElectrodeContactN, self.electrode_count);
        } else {
            family(ChannelFamily::ElectrodeContact, self.electrode_count);
        }
        family(ChannelFamily::DigitalInput, self.digital_inputs);
        if self.has_gyroscope {
            family(ChannelFamily::Gyroscope, MOTION_AXES);
        }
        if self.has_accelerometer {
            family(ChannelFamily::Accelerometer, MOTION_AXES);
        }
        channels.push(ChannelId::STREAMING);
        channels
    }

    pub fn has_channel(&self, ch: ChannelId) -> bool {
        self.channels().binary_search(&ch).is_ok()
    }
}

/// Device found by a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleDevice {
    pub name: String,
    /// Link-layer address, `AA:BB:CC:DD:EE:FF`
    pub address: String,
}

/// Basic battery telemetry pushed by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatteryInfo {
    /// Charge level in percent
    pub level: u8,
    pub is_charger_connected: bool,
    pub is_charging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChargingState {
    #[default]
    Unknown,
    Charging,
    DischargingActive,
    DischargingInactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChargeLevel {
    #[default]
    Unknown,
    Good,
    Low,
    Critical,
}

/// Extended battery telemetry
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FullBatteryInfo {
    pub is_charger_connected: bool,
    /// Charge level in percent
    pub level: u8,
    /// Battery health in percent
    pub health: f32,
    /// Volts
    pub voltage: f32,
    /// Amperes, negative while discharging
    pub current: f32,
    pub charging_state: ChargingState,
    pub charge_level: ChargeLevel,
}

/// Behaviour of the headset while connected to a charger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargingSettings {
    pub enabled_while_charging: bool,
    /// Minutes of inactivity before the device sleeps
    pub sleep_timeout_min: u8,
}

impl ChargingSettings {
    /// Copy with the sleep timeout clamped to the device minimum
    pub fn normalized(self) -> Self {
        Self {
            sleep_timeout_min: self.sleep_timeout_min.max(charging::MIN_SLEEP_TIMEOUT_MIN),
            ..self
        }
    }
}

impl Default for ChargingSettings {
    fn default() -> Self {
        Self {
            enabled_while_charging: false,
            sleep_timeout_min: charging::DEFAULT_SLEEP_TIMEOUT_MIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_codes() {
        assert_eq!(DeviceModel::from_code(2), DeviceModel::Maxi);
        assert_eq!(DeviceModel::from_code(42), DeviceModel::Unknown);
        assert_eq!(DeviceModel::HaloV2.code(), 5);
        assert!(!DeviceModel::Unknown.is_supported());
    }

    #[test]
    fn test_feature_channels_sorted() {
        for model in [
            DeviceModel::MiniV2,
            DeviceModel::Midi,
            DeviceModel::Maxi,
            DeviceModel::Emg,
            DeviceModel::Halo,
        ] {
            let channels = DeviceFeatures::for_model(model).channels();
            assert!(channels.windows(2).all(|w| w[0] < w[1]), "{:?} not sorted", model);
            assert_eq!(channels.first(), Some(&ChannelId::SAMPLE_NUMBER));
            assert_eq!(channels.last(), Some(&ChannelId::STREAMING));
        }
    }

    #[test]
    fn test_bipolar_contacts() {
        let emg = DeviceFeatures::for_model(DeviceModel::Emg);
        assert!(emg.has_channel(ChannelId::contact_p(7)));
        assert!(emg.has_channel(ChannelId::contact_n(0)));
        assert!(!emg.has_channel(ChannelId::contact(0)));

        let midi = DeviceFeatures::for_model(DeviceModel::Midi);
        assert!(midi.has_channel(ChannelId::contact(15)));
        assert!(!midi.has_channel(ChannelId::gyroscope(0)));
        assert!(!midi.supports_rate(StreamRate::Hz500));
    }

    #[test]
    fn test_unknown_model_has_no_channels() {
        assert!(DeviceFeatures::for_model(DeviceModel::Unknown).channels().is_empty());
    }

    #[test]
    fn test_charging_settings_normalized() {
        let settings = ChargingSettings {
            enabled_while_charging: true,
            sleep_timeout_min: 0,
        };
        assert_eq!(settings.normalized().sleep_timeout_min, 1);
        assert_eq!(ChargingSettings::default().sleep_timeout_min, 20);
    }

    #[test]
    fn test_version_display() {
        assert_eq!(Version::new(1, 2, 30).to_string(), "1.2.30");
        assert!(Version::new(1, 3, 0) > Version::new(1, 2, 99));
    }
}
