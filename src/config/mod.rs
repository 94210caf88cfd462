// src/config/mod.rs
//! Configuration: named constants, staged acquisition settings and the core configuration

pub mod acquisition;
pub mod constants;
pub mod loader;

pub use acquisition::{
    AcquisitionSettings, ChannelConfig, ConfigStore, GainMode, ImpedanceMode, Polarity, StreamRate,
};
pub use constants::*;
pub use loader::{ConfigError, ConfigLoader};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Process-wide settings of a [`Core`](crate::manager::Core)
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CoreConfig {
    /// Samples per dispatched chunk
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: usize,

    /// Capacity of each manager's bounded worker queue
    #[serde(default = "defaults::event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Calibration window after stream start during which annotations are refused
    #[serde(default = "defaults::annotation_settle_ms")]
    pub annotation_settle_ms: u64,

    /// Radio adapter used for scanning
    #[serde(default = "defaults::adapter_index")]
    pub adapter_index: u8,

    /// Firmware image used by `start_update`
    #[serde(default)]
    pub update_path: Option<PathBuf>,
}

mod defaults {
    use crate::config::constants::*;

    pub fn chunk_size() -> usize { chunk::DEFAULT_CHUNK_SIZE }
    pub fn event_queue_capacity() -> usize { timing::DEFAULT_EVENT_QUEUE_CAPACITY }
    pub fn annotation_settle_ms() -> u64 { timing::DEFAULT_ANNOTATION_SETTLE_MS }
    pub fn adapter_index() -> u8 { 0 }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: defaults::chunk_size(),
            event_queue_capacity: defaults::event_queue_capacity(),
            annotation_settle_ms: defaults::annotation_settle_ms(),
            adapter_index: defaults::adapter_index(),
            update_path: None,
        }
    }
}

impl CoreConfig {
    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(reason) = validate_chunk_size(self.chunk_size) {
            errors.push(reason);
        }

        if self.event_queue_capacity < timing::MIN_EVENT_QUEUE_CAPACITY {
            errors.push(format!(
                "event_queue_capacity ({}) must be at least {}",
                self.event_queue_capacity,
                timing::MIN_EVENT_QUEUE_CAPACITY
            ));
        }

        if self.annotation_settle_ms > timing::MAX_ANNOTATION_SETTLE_MS {
            errors.push(format!(
                "annotation_settle_ms ({}) must not exceed {}",
                self.annotation_settle_ms,
                timing::MAX_ANNOTATION_SETTLE_MS
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Range check shared by the config file and `Core::set_chunk_size`
pub fn validate_chunk_size(chunk_size: usize) -> Result<(), String> {
    if (chunk::MIN_CHUNK_SIZE..=chunk::MAX_CHUNK_SIZE).contains(&chunk_size) {
        Ok(())
    } else {
        Err(format!(
            "chunk_size ({}) must be within {}..={}",
            chunk_size,
            chunk::MIN_CHUNK_SIZE,
            chunk::MAX_CHUNK_SIZE
        ))
    }
}
