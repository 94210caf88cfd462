// src/hal/traits.rs
//! Transport and scanner boundary
//!
//! The radio link is an external service. A [`Transport`] accepts requests
//! without blocking and reports every outcome later through the
//! [`EventSink`] handed over at connect time; the sink feeds the manager's
//! worker thread.

use crossbeam::channel::{Sender, TrySendError};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

use crate::hal::types::{BatteryInfo, BleDevice, ChargingSettings, DeviceInfo, DeviceModel, FullBatteryInfo};
use crate::manager::worker::WorkerEvent;

/// Errors reported by a transport implementation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("device `{0}` not found")]
    DeviceNotFound(String),

    #[error("unsupported device model {0}")]
    UnsupportedDevice(DeviceModel),

    #[error("device rejected {operation}: {reason}")]
    Rejected { operation: &'static str, reason: String },

    #[error("{0} already in progress")]
    Busy(&'static str),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Why a link went down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Requested,
    Timeout,
    OutOfRange,
    PoweredOff,
}

/// Events a transport pushes towards the manager
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake finished
    Connected(Result<DeviceInfo, TransportError>),
    /// Answer to [`Transport::write_config`]
    ConfigWritten(Result<(), TransportError>),
    /// Answer to [`Transport::start_stream`]
    StreamStarted(Result<(), TransportError>),
    /// Answer to [`Transport::stop_stream`]
    StreamStopped(Result<(), TransportError>),
    /// One radio notification worth of sample frames
    Samples(Vec<u8>),
    Battery(BatteryInfo),
    FullBattery(FullBatteryInfo),
    UpdateProgress { sent: u64, total: u64 },
    UpdateFinished(Result<(), TransportError>),
    /// Link lost without a request from the manager
    Disconnected(DisconnectReason),
}

/// Producer half of a manager's worker queue, bound to one connection session
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<WorkerEvent>,
    session: u64,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    pub(crate) fn new(tx: Sender<WorkerEvent>, session: u64, dropped: Arc<AtomicU64>) -> Self {
        Self { tx, session, dropped }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Deliver an event; returns `false` once the receiving manager is gone.
    ///
    /// Sample packets never block the transport. When the worker queue is
    /// full they are dropped and counted instead.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let message = WorkerEvent::Transport {
            session: self.session,
            event,
        };

        if matches!(message, WorkerEvent::Transport { event: TransportEvent::Samples(_), .. }) {
            return match self.tx.try_send(message) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    trace!(session = self.session, dropped, "worker queue full, sample packet dropped");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            };
        }

        self.tx.send(message).is_ok()
    }
}

/// Device link used by a manager
pub trait Transport: Send + Sync {
    /// Begin connecting to `device_name`; the outcome arrives as [`TransportEvent::Connected`]
    fn connect(&self, device_name: &str, sink: EventSink) -> Result<(), TransportError>;

    /// Tear down the link. No [`TransportEvent::Disconnected`] follows a requested disconnect.
    fn disconnect(&self) -> Result<(), TransportError>;

    /// Write a serialized configuration payload
    fn write_config(&self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Apply `payload` and start streaming sample packets
    fn start_stream(&self, payload: Vec<u8>) -> Result<(), TransportError>;

    fn stop_stream(&self) -> Result<(), TransportError>;

    /// Ask the device for a [`TransportEvent::FullBattery`] report
    fn request_full_battery(&self) -> Result<(), TransportError>;

    fn set_charging_settings(&self, settings: ChargingSettings) -> Result<(), TransportError>;

    /// Start a firmware transfer of the image at `image`
    fn start_update(&self, image: &Path) -> Result<(), TransportError>;
}

/// Radio-level device discovery
pub trait Scanner: Send + Sync {
    fn scan(&self, adapter_index: u8) -> Result<Vec<BleDevice>, TransportError>;
}
