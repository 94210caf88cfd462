// src/manager/state.rs
//! Connection and streaming state machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected{stream} -> Disconnecting -> Disconnected
//!                                   |
//!        Idle -> Starting -> Streaming -> Stopping -> Idle
//! ```
//!
//! Every `begin_*` transition validates its precondition and fails without
//! side effects, so a rejected request never reaches the device. `finish_*`
//! transitions apply the device's answer.

use std::fmt;

use crate::error::{EegError, EegResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Starting,
    Streaming,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Disconnected,
    Connecting,
    Connected(StreamState),
    Disconnecting,
}

impl Default for ManagerState {
    fn default() -> Self {
        ManagerState::Disconnected
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ManagerState::Disconnected => "disconnected",
            ManagerState::Connecting => "connecting",
            ManagerState::Connected(StreamState::Idle) => "connected",
            ManagerState::Connected(StreamState::Starting) => "starting stream",
            ManagerState::Connected(StreamState::Streaming) => "streaming",
            ManagerState::Connected(StreamState::Stopping) => "stopping stream",
            ManagerState::Disconnecting => "disconnecting",
        };
        f.write_str(text)
    }
}

impl ManagerState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ManagerState::Connected(_))
    }

    /// Streaming as observed by callers: a pending start still reads as not
    /// streaming and a pending stop still reads as streaming
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            ManagerState::Connected(StreamState::Streaming | StreamState::Stopping)
        )
    }

    pub fn stream(&self) -> Option<StreamState> {
        match self {
            ManagerState::Connected(stream) => Some(*stream),
            _ => None,
        }
    }

    /// Connected, with no connect in flight
    pub fn ensure_connected(&self, operation: &'static str) -> EegResult<()> {
        match self {
            ManagerState::Connected(_) => Ok(()),
            ManagerState::Connecting => Err(EegError::invalid_state(operation, self)),
            ManagerState::Disconnected | ManagerState::Disconnecting => Err(EegError::NotConnected),
        }
    }

    /// Connected and neither streaming nor switching stream state
    pub fn ensure_idle(&self, operation: &'static str) -> EegResult<()> {
        self.ensure_connected(operation)?;
        match self {
            ManagerState::Connected(StreamState::Idle) => Ok(()),
            _ => Err(EegError::invalid_state(operation, self)),
        }
    }

    /// Staged settings may change in every state except while a connect is pending
    pub fn ensure_not_pending_connect(&self, operation: &'static str) -> EegResult<()> {
        match self {
            ManagerState::Connecting => Err(EegError::invalid_state(operation, self)),
            _ => Ok(()),
        }
    }

    pub fn begin_connect(&mut self) -> EegResult<()> {
        match self {
            ManagerState::Disconnected => {
                *self = ManagerState::Connecting;
                Ok(())
            }
            _ => Err(EegError::invalid_state("connect", *self)),
        }
    }

    pub fn finish_connect(&mut self, success: bool) {
        if *self == ManagerState::Connecting {
            *self = if success {
                ManagerState::Connected(StreamState::Idle)
            } else {
                ManagerState::Disconnected
            };
        }
    }

    pub fn begin_start(&mut self) -> EegResult<()> {
        self.ensure_idle("start stream")?;
        *self = ManagerState::Connected(StreamState::Starting);
        Ok(())
    }

    pub fn finish_start(&mut self, success: bool) {
        if *self == ManagerState::Connected(StreamState::Starting) {
            *self = ManagerState::Connected(if success {
                StreamState::Streaming
            } else {
                StreamState::Idle
            });
        }
    }

    pub fn begin_stop(&mut self) -> EegResult<()> {
        self.ensure_connected("stop stream")?;
        match self {
            ManagerState::Connected(StreamState::Streaming) => {
                *self = ManagerState::Connected(StreamState::Stopping);
                Ok(())
            }
            _ => Err(EegError::invalid_state("stop stream", *self)),
        }
    }

    pub fn finish_stop(&mut self, success: bool) {
        if *self == ManagerState::Connected(StreamState::Stopping) {
            *self = ManagerState::Connected(if success {
                StreamState::Idle
            } else {
                StreamState::Streaming
            });
        }
    }

    /// Enter `Disconnecting`, returning the state left behind; `None` when already down
    pub fn begin_disconnect(&mut self) -> Option<ManagerState> {
        match self {
            ManagerState::Disconnected | ManagerState::Disconnecting => None,
            _ => Some(std::mem::replace(self, ManagerState::Disconnecting)),
        }
    }

    /// Undo a `begin_*` whose request the transport refused outright.
    ///
    /// Only applies while the state is still `in_flight`; a link loss that
    /// landed in between wins. Returns whether the state was restored.
    pub(crate) fn revert_from(&mut self, in_flight: ManagerState, previous: ManagerState) -> bool {
        if *self == in_flight {
            *self = previous;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut state = ManagerState::default();
        state.begin_connect().unwrap();
        assert!(!state.is_connected());
        state.finish_connect(true);
        assert!(state.is_connected());

        state.begin_start().unwrap();
        assert!(!state.is_streaming());
        state.finish_start(true);
        assert!(state.is_streaming());

        state.begin_stop().unwrap();
        assert!(state.is_streaming());
        state.finish_stop(true);
        assert_eq!(state, ManagerState::Connected(StreamState::Idle));
    }

    #[test]
    fn test_duplicate_requests_rejected() {
        let mut state = ManagerState::Connected(StreamState::Starting);
        assert!(matches!(state.begin_start(), Err(EegError::InvalidState { .. })));
        assert!(matches!(state.begin_stop(), Err(EegError::InvalidState { .. })));

        state.finish_start(true);
        assert!(matches!(state.begin_start(), Err(EegError::InvalidState { .. })));

        state.begin_stop().unwrap();
        assert!(matches!(state.begin_stop(), Err(EegError::InvalidState { .. })));
        assert_eq!(state, ManagerState::Connected(StreamState::Stopping));
    }

    #[test]
    fn test_requires_connection() {
        let mut state = ManagerState::Disconnected;
        assert_eq!(state.begin_start(), Err(EegError::NotConnected));
        assert_eq!(state.begin_stop(), Err(EegError::NotConnected));

        state.begin_connect().unwrap();
        assert!(matches!(state.begin_connect(), Err(EegError::InvalidState { .. })));
        assert!(matches!(state.ensure_connected("load config"), Err(EegError::InvalidState { .. })));
        assert!(state.ensure_not_pending_connect("set gain").is_err());
    }

    #[test]
    fn test_failed_acks() {
        let mut state = ManagerState::Connecting;
        state.finish_connect(false);
        assert_eq!(state, ManagerState::Disconnected);

        let mut state = ManagerState::Connected(StreamState::Starting);
        state.finish_start(false);
        assert_eq!(state, ManagerState::Connected(StreamState::Idle));

        let mut state = ManagerState::Connected(StreamState::Stopping);
        state.finish_stop(false);
        assert_eq!(state, ManagerState::Connected(StreamState::Streaming));
    }

    #[test]
    fn test_disconnect_from_any_live_state() {
        let mut state = ManagerState::Connected(StreamState::Streaming);
        assert_eq!(state.begin_disconnect(), Some(ManagerState::Connected(StreamState::Streaming)));
        assert_eq!(state, ManagerState::Disconnecting);
        assert_eq!(state.begin_disconnect(), None);
        assert_eq!(state.ensure_connected("annotate"), Err(EegError::NotConnected));

        let mut state = ManagerState::Connecting;
        assert_eq!(state.begin_disconnect(), Some(ManagerState::Connecting));
    }

    #[test]
    fn test_revert_only_from_in_flight_state() {
        let starting = ManagerState::Connected(StreamState::Starting);
        let idle = ManagerState::Connected(StreamState::Idle);

        let mut state = starting;
        assert!(state.revert_from(starting, idle));
        assert_eq!(state, idle);

        let mut state = ManagerState::Disconnected;
        assert!(!state.revert_from(starting, idle));
        assert_eq!(state, ManagerState::Disconnected);

        let mut state = ManagerState::Disconnecting;
        assert!(!state.revert_from(ManagerState::Connecting, ManagerState::Disconnected));
        assert_eq!(state, ManagerState::Disconnecting);
    }

    #[test]
    fn test_stale_ack_ignored() {
        let mut state = ManagerState::Disconnected;
        state.finish_start(true);
        state.finish_connect(true);
        assert_eq!(state, ManagerState::Disconnected);
    }
}
