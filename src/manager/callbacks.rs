// src/manager/callbacks.rs
//! Consumer callbacks and pending request completions
//!
//! Push callbacks have exactly one registration slot each; registering
//! replaces the previous handler and clearing empties the slot. They run on
//! the manager's worker thread and must not call back into the manager's
//! registration methods.

use parking_lot::Mutex;
use std::fmt;

use crate::acquisition::chunk::Chunk;
use crate::config::acquisition::AcquisitionSettings;
use crate::error::{EegError, EegResult};
use crate::hal::traits::DisconnectReason;
use crate::hal::types::{BatteryInfo, FullBatteryInfo};

pub type ChunkCallback = Box<dyn FnMut(&Chunk) + Send>;
pub type BatteryCallback = Box<dyn FnMut(&BatteryInfo) + Send>;
pub type DisconnectCallback = Box<dyn FnMut(DisconnectReason) + Send>;
pub type Completion = Box<dyn FnOnce(EegResult<()>) + Send>;
pub type FullBatteryCompletion = Box<dyn FnOnce(EegResult<FullBatteryInfo>) + Send>;
pub type ProgressCallback = Box<dyn FnMut(u64, u64) + Send>;

#[derive(Default)]
pub(crate) struct Callbacks {
    pub chunk: Mutex<Option<ChunkCallback>>,
    pub battery: Mutex<Option<BatteryCallback>>,
    pub disconnect: Mutex<Option<DisconnectCallback>>,
}

impl Callbacks {
    pub fn notify_battery(&self, info: &BatteryInfo) {
        if let Some(callback) = self.battery.lock().as_mut() {
            callback(info);
        }
    }

    pub fn notify_disconnect(&self, reason: DisconnectReason) {
        if let Some(callback) = self.disconnect.lock().as_mut() {
            callback(reason);
        }
    }
}

pub(crate) struct UpdateHandlers {
    pub on_progress: ProgressCallback,
    pub on_done: Completion,
}

/// Requests waiting for their device answer
#[derive(Default)]
pub(crate) struct PendingRequests {
    pub connect: Option<Completion>,
    pub load_config: Option<(AcquisitionSettings, Completion)>,
    pub start: Option<(AcquisitionSettings, Completion)>,
    pub stop: Option<Completion>,
    pub full_battery: Vec<FullBatteryCompletion>,
    pub update: Option<UpdateHandlers>,
}

impl PendingRequests {
    pub fn is_empty(&self) -> bool {
        self.connect.is_none()
            && self.load_config.is_none()
            && self.start.is_none()
            && self.stop.is_none()
            && self.full_battery.is_empty()
            && self.update.is_none()
    }

    /// Complete every waiting request with `err`
    pub fn fail_all(self, err: EegError) {
        if let Some(done) = self.connect {
            done(Err(err.clone()));
        }
        if let Some((_, done)) = self.load_config {
            done(Err(err.clone()));
        }
        if let Some((_, done)) = self.start {
            done(Err(err.clone()));
        }
        if let Some(done) = self.stop {
            done(Err(err.clone()));
        }
        for done in self.full_battery {
            done(Err(err.clone()));
        }
        if let Some(update) = self.update {
            (update.on_done)(Err(err));
        }
    }
}

impl fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequests")
            .field("connect", &self.connect.is_some())
            .field("load_config", &self.load_config.is_some())
            .field("start", &self.start.is_some())
            .field("stop", &self.stop.is_some())
            .field("full_battery", &self.full_battery.len())
            .field("update", &self.update.is_some())
            .finish()
    }
}
