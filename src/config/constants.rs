//! Named constants shared by the manager, the codecs and the simulator

/// Chunk assembly constants
pub mod chunk {
    pub const DEFAULT_CHUNK_SIZE: usize = 25;
    pub const MIN_CHUNK_SIZE: usize = 1;
    pub const MAX_CHUNK_SIZE: usize = 100;
}

/// Defaults applied to settings that were not touched since the last reset
pub mod acquisition {
    use crate::config::acquisition::{GainMode, ImpedanceMode, StreamRate};

    pub const DEFAULT_GAIN: GainMode = GainMode::X8;
    pub const DEFAULT_IMPEDANCE_MODE: ImpedanceMode = ImpedanceMode::Off;
    pub const DEFAULT_STREAM_RATE: StreamRate = StreamRate::Hz250;
}

/// Worker and timing constants
pub mod timing {
    pub const NANOSECONDS_PER_SECOND: u64 = 1_000_000_000;
    pub const NANOSECONDS_PER_MILLISECOND: u64 = 1_000_000;

    /// Time after stream start during which annotation timestamps are not stable
    pub const DEFAULT_ANNOTATION_SETTLE_MS: u64 = 500;
    pub const MAX_ANNOTATION_SETTLE_MS: u64 = 10_000;

    pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;
    pub const MIN_EVENT_QUEUE_CAPACITY: usize = 16;
}

/// Charging behaviour defaults reported by the SDK
pub mod charging {
    pub const DEFAULT_SLEEP_TIMEOUT_MIN: u8 = 20;
    pub const MIN_SLEEP_TIMEOUT_MIN: u8 = 1;
}

/// Configuration write payload layout
pub mod protocol {
    pub const CONFIG_MAGIC: [u8; 2] = [0xBA, 0xC0];
    pub const CONFIG_FORMAT_VERSION: u8 = 1;
    /// magic + version + rate + impedance + channel count
    pub const CONFIG_HEADER_LEN: usize = 7;
    /// id (u16) + flags + gain + polarity
    pub const CONFIG_ENTRY_LEN: usize = 5;
    pub const CONFIG_CRC_LEN: usize = 4;
    pub const FLAG_ENABLED: u8 = 0b0000_0001;
}

/// File locations searched by the config loader
pub mod paths {
    pub const CONFIG_FILE_NAME: &str = "eeg-manager.toml";
    pub const SYSTEM_CONFIG_DIR: &str = "/etc/eeg-manager";
    pub const ENV_PREFIX: &str = "EEG_MANAGER";
    pub const ENV_SEPARATOR: &str = "__";
}
