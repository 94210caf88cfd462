// src/hal/mod.rs
//! Hardware abstraction layer: device types, the transport boundary and the wire protocol

pub mod protocol;
pub mod simulator;
pub mod traits;
pub mod types;

pub use protocol::{decode_config, encode_config, ProtocolError};
pub use simulator::{HeadsetSimulator, Pacing, SimulatedDevice, SimulatorConfig};
pub use traits::*;
pub use types::*;
