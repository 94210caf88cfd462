//! EEG-Manager: device manager for wireless multi-channel EEG/EMG headsets
//!
//! The crate sits between an application and a headset reached through a
//! radio transport. It provides:
//!
//! - A process-wide [`Core`] holding the chunk size and the configuration
//! - One [`EegManager`] per headset driving connect, configuration and streaming
//! - A stable channel id space and per-session column layout
//! - Chunked delivery of decoded sample frames to a registered consumer
//! - Sample-indexed annotations, battery telemetry and firmware updates
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use eeg_manager::{ChannelId, Core, CoreConfig, EegManager};
//! use eeg_manager::hal::HeadsetSimulator;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let core = Core::init(CoreConfig::default())?;
//!     let headset = Arc::new(HeadsetSimulator::default());
//!     let mut manager = EegManager::new(&core, headset.clone())?;
//!
//!     manager.set_chunk_callback(|chunk| {
//!         println!("{} samples in {} columns", chunk.len(), chunk.columns().len());
//!     });
//!     manager.connect(&headset.device_names()[0], |result| {
//!         println!("connected: {:?}", result);
//!     })?;
//!     manager.set_channel_enabled(ChannelId::electrode(0), true)?;
//!     manager.start_stream(|result| println!("streaming: {:?}", result))?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod acquisition;
pub mod config;
pub mod error;
pub mod hal;
pub mod manager;
pub mod utils;

// Re-export commonly used types for convenience
pub use acquisition::{Annotation, ChannelId, ChannelLayout, Chunk, Column, WireType};
pub use config::{ConfigLoader, CoreConfig, GainMode, ImpedanceMode, Polarity, StreamRate};
pub use error::{EegError, EegResult, ErrorKind};
pub use hal::{
    BatteryInfo, BleDevice, ChargingSettings, DeviceFeatures, DeviceInfo, DeviceModel, DisconnectReason,
    FullBatteryInfo, Scanner, Transport, TransportError, TransportEvent, Version,
};
pub use manager::{Core, EegManager, EegManagerBuilder, ManagerState, StreamState};
pub use utils::time::TimeProvider;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    let mut features = vec![
        "Connection lifecycle and streaming state machine".to_string(),
        "Chunked sample delivery".to_string(),
        "Staged per-channel configuration".to_string(),
        "Sample-indexed annotations".to_string(),
    ];
    if cfg!(feature = "tokio") {
        features.push("Async request wrappers".to_string());
    }

    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Device manager for wireless multi-channel EEG/EMG headsets".to_string(),
        features,
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}
