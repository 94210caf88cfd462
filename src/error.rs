// src/error.rs
//! Unified error handling for the EEG device manager
//!
//! Request calls report accept/reject-at-request-time failures synchronously;
//! device-side outcomes arrive as the payload of the paired completion
//! callback. Both use [`EegError`], and every variant classifies into an
//! [`ErrorKind`] so callers can decide whether a retry makes sense.

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::hal::types::DeviceModel;

/// Result alias used throughout the crate
pub type EegResult<T> = Result<T, EegError>;

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Not connected, link failure, core not initialized
    Connection,
    /// Invalid or unsupported value for the current device or state
    Configuration,
    /// The device lacks the hardware for the request
    Capability,
    /// Temporarily unavailable; the same call may succeed later
    Transient,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Capability => "capability",
            ErrorKind::Transient => "transient",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Unified error type of the crate
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EegError {
    #[error("device is not connected")]
    NotConnected,

    #[error("link error during {operation}: {reason}")]
    Link { operation: &'static str, reason: String },

    #[error("core is not initialized")]
    CoreNotInitialized,

    #[error("core is already initialized")]
    AlreadyInitialized,

    #[error("{0} device manager(s) still open")]
    ManagersStillOpen(usize),

    #[error("cannot {operation} while {state}")]
    InvalidState { operation: &'static str, state: String },

    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("wrong value for {what}: {value}")]
    WrongValue { what: &'static str, value: String },

    #[error("{model} does not support {what}")]
    Unsupported { model: DeviceModel, what: String },

    #[error("annotations are unavailable while the device is calibrating")]
    AnnotationCalibrating,

    #[error("firmware update file not found: {}", .0.display())]
    UpdateFileNotFound(PathBuf),

    #[error("firmware update failed: {0}")]
    UpdateFailed(String),

    #[error("no devices found")]
    NoDevicesFound,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Unknown(String),
}

impl EegError {
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        EegError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    pub fn invalid_state(operation: &'static str, state: impl fmt::Display) -> Self {
        EegError::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    pub fn link(operation: &'static str, reason: impl Into<String>) -> Self {
        EegError::Link {
            operation,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EegError::NotConnected
            | EegError::Link { .. }
            | EegError::CoreNotInitialized
            | EegError::AlreadyInitialized
            | EegError::ManagersStillOpen(_)
            | EegError::NoDevicesFound => ErrorKind::Connection,
            EegError::InvalidState { .. }
            | EegError::InvalidArgument { .. }
            | EegError::WrongValue { .. }
            | EegError::UpdateFileNotFound(_)
            | EegError::Config(_) => ErrorKind::Configuration,
            EegError::Unsupported { .. } => ErrorKind::Capability,
            EegError::AnnotationCalibrating => ErrorKind::Transient,
            EegError::UpdateFailed(_) | EegError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Whether repeating the identical call later can succeed without other changes
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<crate::hal::traits::TransportError> for EegError {
    fn from(err: crate::hal::traits::TransportError) -> Self {
        use crate::hal::traits::TransportError;

        match err {
            TransportError::NotConnected => EegError::NotConnected,
            TransportError::DeviceNotFound(name) => EegError::link("connect", format!("device `{}` not found", name)),
            TransportError::UnsupportedDevice(model) => EegError::Unsupported {
                model,
                what: "connection".to_string(),
            },
            TransportError::Rejected { operation, reason } => EegError::link(operation, reason),
            TransportError::Busy(operation) => EegError::invalid_state(operation, "device is busy"),
            TransportError::Io(reason) => EegError::link("transport", reason),
        }
    }
}

impl From<crate::hal::protocol::ProtocolError> for EegError {
    fn from(err: crate::hal::protocol::ProtocolError) -> Self {
        EegError::WrongValue {
            what: "configuration payload",
            value: err.to_string(),
        }
    }
}

impl From<crate::acquisition::frame::FrameError> for EegError {
    fn from(err: crate::acquisition::frame::FrameError) -> Self {
        EegError::WrongValue {
            what: "sample packet",
            value: err.to_string(),
        }
    }
}

impl From<crate::config::loader::ConfigError> for EegError {
    fn from(err: crate::config::loader::ConfigError) -> Self {
        EegError::Config(err.to_string())
    }
}

/// Convenience conversion of foreign errors
pub trait IntoEegError<T> {
    fn eeg_err(self, operation: &'static str) -> EegResult<T>;
}

impl<T, E> IntoEegError<T> for Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn eeg_err(self, operation: &'static str) -> EegResult<T> {
        self.map_err(|err| EegError::Unknown(format!("{}: {}", operation, err)))
    }
}
