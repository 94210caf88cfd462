// src/manager/mod.rs
//! Device manager: connection lifecycle, staged configuration, streaming and caches
//!
//! Control calls take `&mut self`, so one caller drives a manager at a time.
//! Requests that need the device return as soon as they are accepted or
//! rejected; the device's answer is delivered later to the completion
//! closure on the manager's worker thread.

#[cfg(feature = "tokio")]
pub mod asynchronous;
pub mod callbacks;
pub mod core;
pub mod state;
pub(crate) mod worker;

pub use self::core::Core;
pub use callbacks::{
    BatteryCallback, ChunkCallback, Completion, DisconnectCallback, FullBatteryCompletion, ProgressCallback,
};
pub use state::{ManagerState, StreamState};

use crossbeam::channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use crate::acquisition::annotations::{Annotation, AnnotationLog};
use crate::acquisition::channel::{ChannelId, ChannelLayout, WireType};
use crate::acquisition::chunk::Chunk;
use crate::config::acquisition::{
    AcquisitionSettings, ConfigStore, GainMode, ImpedanceMode, Polarity, StreamRate,
};
use crate::error::{EegError, EegResult};
use crate::hal::protocol::encode_config;
use crate::hal::traits::{DisconnectReason, EventSink, Transport};
use crate::hal::types::{BatteryInfo, ChargingSettings, DeviceFeatures, DeviceInfo, FullBatteryInfo};
use crate::utils::time::{MonotonicTimeProvider, TimeProvider};
use self::callbacks::{Callbacks, PendingRequests, UpdateHandlers};
use self::core::CoreHandle;
use self::worker::{Worker, WorkerEvent};

const STARTING: ManagerState = ManagerState::Connected(StreamState::Starting);
const STOPPING: ManagerState = ManagerState::Connected(StreamState::Stopping);

/// Identity and capabilities of the connected device
#[derive(Debug, Clone)]
pub(crate) struct ConnectedDevice {
    pub info: DeviceInfo,
    pub features: DeviceFeatures,
}

/// State shared between a manager and its worker
pub(crate) struct ManagerShared {
    pub state: Mutex<ManagerState>,
    pub staged: Mutex<ConfigStore>,
    pub device: RwLock<Option<ConnectedDevice>>,
    /// Last configuration the device acknowledged
    pub applied: RwLock<Option<AcquisitionSettings>>,
    /// Column layout of the running stream session
    pub session_layout: RwLock<Option<Arc<ChannelLayout>>>,
    pub annotations: Mutex<AnnotationLog>,
    pub battery: RwLock<BatteryInfo>,
    pub full_battery: RwLock<FullBatteryInfo>,
    pub charging: RwLock<ChargingSettings>,
    pub callbacks: Callbacks,
    pub pending: Mutex<PendingRequests>,
    pub stream_started_at_ms: Mutex<Option<u64>>,
    stream_counted: AtomicBool,
    pub sample_index: Arc<AtomicU64>,
    session: AtomicU64,
    pub frames_dropped: Arc<AtomicU64>,
    pub frames_malformed: AtomicU64,
    pub core: CoreHandle,
    pub time: Arc<dyn TimeProvider>,
}

impl ManagerShared {
    fn new(core: CoreHandle, time: Arc<dyn TimeProvider>) -> Self {
        Self {
            state: Mutex::new(ManagerState::Disconnected),
            staged: Mutex::new(ConfigStore::new()),
            device: RwLock::new(None),
            applied: RwLock::new(None),
            session_layout: RwLock::new(None),
            annotations: Mutex::new(AnnotationLog::new()),
            battery: RwLock::new(BatteryInfo::default()),
            full_battery: RwLock::new(FullBatteryInfo::default()),
            charging: RwLock::new(ChargingSettings::default()),
            callbacks: Callbacks::default(),
            pending: Mutex::new(PendingRequests::default()),
            stream_started_at_ms: Mutex::new(None),
            stream_counted: AtomicBool::new(false),
            sample_index: Arc::new(AtomicU64::new(0)),
            session: AtomicU64::new(0),
            frames_dropped: Arc::new(AtomicU64::new(0)),
            frames_malformed: AtomicU64::new(0),
            core,
            time,
        }
    }

    pub fn current_session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    fn next_session(&self) -> u64 {
        self.session.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Count this manager as streaming; returns the chunk size for the session
    pub fn begin_stream_accounting(&self) -> usize {
        if !self.stream_counted.swap(true, Ordering::AcqRel) {
            self.core.begin_stream()
        } else {
            self.core.chunk_size()
        }
    }

    pub fn end_stream_accounting(&self) {
        if self.stream_counted.swap(false, Ordering::AcqRel) {
            self.core.stream_stopped();
        }
    }

    /// Reset everything tied to the connection and enter `Disconnected`.
    ///
    /// The caller has already moved the state to `Disconnecting`. Returns the
    /// requests that were still waiting for the device.
    pub fn teardown(&self) -> PendingRequests {
        self.next_session();
        self.end_stream_accounting();
        *self.device.write() = None;
        *self.applied.write() = None;
        *self.session_layout.write() = None;
        *self.stream_started_at_ms.lock() = None;
        *self.charging.write() = ChargingSettings::default();
        self.annotations.lock().clear();
        self.staged.lock().reset();
        let pending = std::mem::take(&mut *self.pending.lock());
        *self.state.lock() = ManagerState::Disconnected;
        pending
    }

    fn features(&self) -> EegResult<DeviceFeatures> {
        self.device
            .read()
            .as_ref()
            .map(|device| device.features.clone())
            .ok_or(EegError::NotConnected)
    }

    /// Layout of the running session, or the one the next start would use
    fn effective_layout(&self) -> Option<Arc<ChannelLayout>> {
        if let Some(layout) = self.session_layout.read().as_ref() {
            return Some(layout.clone());
        }
        let features = self.features().ok()?;
        let settings = self.staged.lock().resolve(&features).ok()?;
        Some(Arc::new(settings.layout()))
    }
}

/// Builder for [`EegManager`]
pub struct EegManagerBuilder<'a> {
    core: &'a Core,
    transport: Arc<dyn Transport>,
    time: Option<Arc<dyn TimeProvider>>,
}

impl<'a> EegManagerBuilder<'a> {
    /// Clock for the annotation calibration window
    pub fn time_provider(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn build(self) -> EegResult<EegManager> {
        let handle = self.core.handle();
        handle.ensure_alive()?;

        let capacity = handle.config().event_queue_capacity;
        let (tx, rx) = bounded(capacity);
        let time = self.time.unwrap_or_else(|| Arc::new(MonotonicTimeProvider::new()));
        let shared = Arc::new(ManagerShared::new(handle.clone(), time));
        let worker = Worker::spawn(shared.clone(), self.transport.clone(), rx)?;

        handle.manager_opened();
        debug!(capacity, "device manager created");
        Ok(EegManager {
            shared,
            transport: self.transport,
            tx,
            worker: Some(worker),
        })
    }
}

/// Manager of one headset connection
pub struct EegManager {
    shared: Arc<ManagerShared>,
    transport: Arc<dyn Transport>,
    tx: Sender<WorkerEvent>,
    worker: Option<JoinHandle<()>>,
}

impl EegManager {
    pub fn builder(core: &Core, transport: Arc<dyn Transport>) -> EegManagerBuilder<'_> {
        EegManagerBuilder {
            core,
            transport,
            time: None,
        }
    }

    pub fn new(core: &Core, transport: Arc<dyn Transport>) -> EegResult<EegManager> {
        Self::builder(core, transport).build()
    }

    // ---- connection lifecycle ----

    /// Connect to the device called `device_name`.
    ///
    /// `on_done` receives the handshake outcome; an unsupported model fails
    /// with [`EegError::Unsupported`].
    pub fn connect<F>(&mut self, device_name: &str, on_done: F) -> EegResult<()>
    where
        F: FnOnce(EegResult<()>) + Send + 'static,
    {
        self.shared.core.ensure_alive()?;
        self.shared.state.lock().begin_connect()?;

        let session = self.shared.next_session();
        self.shared.pending.lock().connect = Some(Box::new(on_done));
        let sink = EventSink::new(self.tx.clone(), session, self.shared.frames_dropped.clone());

        if let Err(err) = self.transport.connect(device_name, sink) {
            self.shared.pending.lock().connect = None;
            self.shared
                .state
                .lock()
                .revert_from(ManagerState::Connecting, ManagerState::Disconnected);
            warn!(device = device_name, error = %err, "connect rejected");
            return Err(err.into());
        }

        info!(device = device_name, session, "connecting");
        Ok(())
    }

    /// Tear the connection down, stopping a running stream first.
    ///
    /// Always ends in `Disconnected`. Staged settings, device info and the
    /// annotation log are cleared; requests still waiting for the device fail
    /// with [`EegError::NotConnected`].
    pub fn disconnect(&mut self) {
        let Some(previous) = self.shared.state.lock().begin_disconnect() else {
            return;
        };
        self.shared.next_session();

        if matches!(
            previous.stream(),
            Some(StreamState::Starting | StreamState::Streaming | StreamState::Stopping)
        ) {
            debug!("stopping stream before disconnect");
            if let Err(err) = self.transport.stop_stream() {
                debug!(error = %err, "implicit stream stop failed");
            }
        }
        if let Err(err) = self.transport.disconnect() {
            warn!(error = %err, "transport disconnect failed");
        }

        let pending = self.shared.teardown();
        let notice = WorkerEvent::DisconnectNotice {
            pending,
            notify: previous.is_connected(),
        };
        if self.tx.send(notice).is_err() {
            warn!("manager worker unavailable, disconnect notice lost");
        }
        info!(from = %previous, "disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().is_connected()
    }

    pub fn state(&self) -> ManagerState {
        *self.shared.state.lock()
    }

    /// Identity of the connected device, `None` when disconnected
    pub fn get_device_info(&self) -> Option<DeviceInfo> {
        self.shared.device.read().as_ref().map(|device| device.info.clone())
    }

    pub fn get_device_features(&self) -> Option<DeviceFeatures> {
        self.shared.features().ok()
    }

    // ---- staged configuration ----

    pub fn set_channel_enabled(&mut self, ch: ChannelId, enabled: bool) -> EegResult<()> {
        self.shared.state.lock().ensure_not_pending_connect("set channel enabled")?;
        self.shared.staged.lock().set_channel_enabled(ch, enabled)
    }

    pub fn set_channel_gain(&mut self, ch: ChannelId, gain: GainMode) -> EegResult<()> {
        self.shared.state.lock().ensure_not_pending_connect("set channel gain")?;
        self.shared.staged.lock().set_channel_gain(ch, gain)
    }

    /// Designate `ch` as a bias electrode with the given polarity
    pub fn set_channel_bias(&mut self, ch: ChannelId, polarity: Polarity) -> EegResult<()> {
        self.shared.state.lock().ensure_not_pending_connect("set channel bias")?;
        self.shared.staged.lock().set_channel_bias(ch, polarity)
    }

    pub fn set_impedance_mode(&mut self, mode: ImpedanceMode) -> EegResult<()> {
        self.shared.state.lock().ensure_not_pending_connect("set impedance mode")?;
        self.shared.staged.lock().set_impedance_mode(mode);
        Ok(())
    }

    /// Stage a stream rate.
    ///
    /// While connected the rate must be supported by the device model; a
    /// rejected rate leaves the previous value in place. While disconnected
    /// the rate is checked again when it is pushed.
    pub fn set_data_stream_rate(&mut self, rate: StreamRate) -> EegResult<()> {
        let state = *self.shared.state.lock();
        state.ensure_not_pending_connect("set stream rate")?;

        if state.is_connected() {
            let features = self.shared.features()?;
            if !features.supports_rate(rate) {
                debug!(%rate, model = ?features.model, "stream rate rejected");
                return Err(EegError::Unsupported {
                    model: features.model,
                    what: format!("stream rate {}", rate),
                });
            }
        }

        self.shared.staged.lock().set_stream_rate(rate);
        Ok(())
    }

    /// Stage a stream rate given in Hz
    pub fn set_data_stream_rate_hz(&mut self, hz: u32) -> EegResult<()> {
        let rate = StreamRate::from_hz(hz)
            .ok_or_else(|| EegError::invalid_argument("stream_rate", format!("{} Hz is not a device rate", hz)))?;
        self.set_data_stream_rate(rate)
    }

    /// Push the staged configuration to the device.
    ///
    /// On failure the staged values stay as they are so the push can be retried.
    pub fn load_config<F>(&mut self, on_done: F) -> EegResult<()>
    where
        F: FnOnce(EegResult<()>) + Send + 'static,
    {
        let state = *self.shared.state.lock();
        state.ensure_connected("load config")?;
        if matches!(state.stream(), Some(StreamState::Starting | StreamState::Stopping)) {
            return Err(EegError::invalid_state("load config", state));
        }

        let features = self.shared.features()?;
        let settings = self.shared.staged.lock().resolve(&features)?;
        let payload = encode_config(&settings);

        {
            let mut pending = self.shared.pending.lock();
            if pending.load_config.is_some() {
                return Err(EegError::invalid_state("load config", "a configuration write is pending"));
            }
            pending.load_config = Some((settings, Box::new(on_done)));
        }

        if let Err(err) = self.transport.write_config(payload) {
            self.shared.pending.lock().load_config = None;
            warn!(error = %err, "configuration write rejected");
            return Err(err.into());
        }

        debug!(streaming = state.is_streaming(), "configuration write requested");
        Ok(())
    }

    // ---- streaming ----

    /// Resolve the staged configuration, push it and start streaming
    pub fn start_stream<F>(&mut self, on_done: F) -> EegResult<()>
    where
        F: FnOnce(EegResult<()>) + Send + 'static,
    {
        let previous = {
            let mut state = self.shared.state.lock();
            let previous = *state;
            state.begin_start()?;
            previous
        };

        let settings = match self
            .shared
            .features()
            .and_then(|features| self.shared.staged.lock().resolve(&features))
        {
            Ok(settings) => settings,
            Err(err) => {
                self.shared.state.lock().revert_from(STARTING, previous);
                return Err(err);
            }
        };

        let payload = encode_config(&settings);
        let rate = settings.stream_rate;
        self.shared.pending.lock().start = Some((settings, Box::new(on_done)));

        if let Err(err) = self.transport.start_stream(payload) {
            self.shared.pending.lock().start = None;
            if !self.shared.state.lock().revert_from(STARTING, previous) {
                debug!("link lost while the stream start was issued");
            }
            warn!(error = %err, "stream start rejected");
            return Err(err.into());
        }

        debug!(%rate, "stream start requested");
        Ok(())
    }

    /// Stop streaming; on success every staged setting is reset to its default
    pub fn stop_stream<F>(&mut self, on_done: F) -> EegResult<()>
    where
        F: FnOnce(EegResult<()>) + Send + 'static,
    {
        let previous = {
            let mut state = self.shared.state.lock();
            let previous = *state;
            state.begin_stop()?;
            previous
        };

        self.shared.pending.lock().stop = Some(Box::new(on_done));

        if let Err(err) = self.transport.stop_stream() {
            self.shared.pending.lock().stop = None;
            if !self.shared.state.lock().revert_from(STOPPING, previous) {
                debug!("link lost while the stream stop was issued");
            }
            warn!(error = %err, "stream stop rejected");
            return Err(err.into());
        }

        debug!("stream stop requested");
        Ok(())
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.state.lock().is_streaming()
    }

    /// Column index of `ch` in delivered chunks.
    ///
    /// Stable for a running session. Between sessions it reflects the staged
    /// configuration; `None` when the channel is not enabled or the device is
    /// not connected.
    pub fn get_channel_index(&self, ch: ChannelId) -> Option<usize> {
        self.shared.effective_layout()?.index_of(ch)
    }

    /// Wire type of every chunk column, in column order
    pub fn stream_channel_types(&self) -> Vec<WireType> {
        self.shared
            .effective_layout()
            .map(|layout| layout.wire_types().to_vec())
            .unwrap_or_default()
    }

    /// Rate of the running stream, otherwise the rate the next start would use
    pub fn get_sample_frequency(&self) -> u32 {
        if self.is_streaming() {
            if let Some(applied) = self.shared.applied.read().as_ref() {
                return applied.stream_rate.hz();
            }
        }
        self.shared.staged.lock().stream_rate().hz()
    }

    /// Register the chunk consumer, replacing any previous one
    pub fn set_chunk_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&Chunk) + Send + 'static,
    {
        *self.shared.callbacks.chunk.lock() = Some(Box::new(callback));
    }

    pub fn clear_chunk_callback(&mut self) {
        *self.shared.callbacks.chunk.lock() = None;
    }

    /// Sample packets dropped because the worker queue was full
    pub fn frames_dropped(&self) -> u64 {
        self.shared.frames_dropped.load(Ordering::Relaxed)
    }

    /// Sample packets dropped because they did not match the frame layout
    pub fn frames_malformed(&self) -> u64 {
        self.shared.frames_malformed.load(Ordering::Relaxed)
    }

    // ---- annotations ----

    /// Append an annotation at the current sample index.
    ///
    /// Refused with [`EegError::AnnotationCalibrating`] until the calibration
    /// window after stream start has passed.
    pub fn annotate(&mut self, text: impl Into<String>) -> EegResult<()> {
        let state = *self.shared.state.lock();
        state.ensure_connected("annotate")?;
        if state != ManagerState::Connected(StreamState::Streaming) {
            return Err(EegError::invalid_state("annotate", state));
        }

        let started = (*self.shared.stream_started_at_ms.lock())
            .ok_or_else(|| EegError::invalid_state("annotate", state))?;
        let settle_ms = self.shared.core.config().annotation_settle_ms;
        if self.shared.time.now_millis().saturating_sub(started) < settle_ms {
            return Err(EegError::AnnotationCalibrating);
        }

        let timestamp = self.shared.sample_index.load(Ordering::Acquire);
        self.shared.annotations.lock().push(timestamp, text);
        Ok(())
    }

    /// Every annotation of the session, in append order
    pub fn get_annotations(&self) -> Vec<Annotation> {
        self.shared.annotations.lock().entries().to_vec()
    }

    pub fn clear_annotations(&mut self) {
        self.shared.annotations.lock().clear();
    }

    // ---- battery and device telemetry ----

    /// Last battery report pushed by the device; zeroed until the first one
    pub fn get_battery_info(&self) -> BatteryInfo {
        *self.shared.battery.read()
    }

    pub fn get_full_battery_info(&self) -> FullBatteryInfo {
        *self.shared.full_battery.read()
    }

    /// Ask the device for a full battery report
    pub fn request_full_battery_info<F>(&mut self, on_done: F) -> EegResult<()>
    where
        F: FnOnce(EegResult<FullBatteryInfo>) + Send + 'static,
    {
        self.shared.state.lock().ensure_connected("request battery info")?;
        self.shared.pending.lock().full_battery.push(Box::new(on_done));

        if let Err(err) = self.transport.request_full_battery() {
            self.shared.pending.lock().full_battery.pop();
            return Err(err.into());
        }
        Ok(())
    }

    pub fn set_battery_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&BatteryInfo) + Send + 'static,
    {
        *self.shared.callbacks.battery.lock() = Some(Box::new(callback));
    }

    pub fn clear_battery_callback(&mut self) {
        *self.shared.callbacks.battery.lock() = None;
    }

    /// Register the disconnect handler, called once per disconnection
    pub fn set_disconnect_callback<F>(&mut self, callback: F)
    where
        F: FnMut(DisconnectReason) + Send + 'static,
    {
        *self.shared.callbacks.disconnect.lock() = Some(Box::new(callback));
    }

    pub fn clear_disconnect_callback(&mut self) {
        *self.shared.callbacks.disconnect.lock() = None;
    }

    pub fn get_charging_settings(&self) -> ChargingSettings {
        *self.shared.charging.read()
    }

    /// Send charging behaviour to the device; a zero sleep timeout is stored as one minute
    pub fn set_charging_settings(&mut self, settings: ChargingSettings) -> EegResult<()> {
        self.shared.state.lock().ensure_connected("set charging settings")?;
        let settings = settings.normalized();
        self.transport.set_charging_settings(settings)?;
        *self.shared.charging.write() = settings;
        Ok(())
    }

    // ---- firmware update ----

    /// Transfer the configured firmware image to the device.
    ///
    /// Requires a connected, idle device and an existing `update_path`.
    pub fn start_update<P, F>(&mut self, on_progress: P, on_done: F) -> EegResult<()>
    where
        P: FnMut(u64, u64) + Send + 'static,
        F: FnOnce(EegResult<()>) + Send + 'static,
    {
        self.shared.state.lock().ensure_idle("start update")?;

        let path = self.shared.core.config().update_path.unwrap_or_default();
        if !path.is_file() {
            return Err(EegError::UpdateFileNotFound(path));
        }

        {
            let mut pending = self.shared.pending.lock();
            if pending.update.is_some() {
                return Err(EegError::invalid_state("start update", "an update is running"));
            }
            pending.update = Some(UpdateHandlers {
                on_progress: Box::new(on_progress),
                on_done: Box::new(on_done),
            });
        }

        if let Err(err) = self.transport.start_update(&path) {
            self.shared.pending.lock().update = None;
            return Err(err.into());
        }

        info!(image = %path.display(), "firmware update started");
        Ok(())
    }

    /// Path of the firmware image `start_update` would send
    pub fn update_path(&self) -> Option<PathBuf> {
        self.shared.core.config().update_path
    }
}

impl Drop for EegManager {
    fn drop(&mut self) {
        self.disconnect();
        let _ = self.tx.send(WorkerEvent::Shutdown);

        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != std::thread::current().id() && worker.join().is_err() {
                warn!("manager worker panicked");
            }
        }
        self.shared.core.manager_closed();
        debug!("device manager dropped");
    }
}
