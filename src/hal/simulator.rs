// src/hal/simulator.rs
//! Simulated headset transport
//!
//! Implements [`Transport`] and [`Scanner`] against an in-process device so
//! managers can be driven without a radio. Streams are either paced in real
//! time by a background thread or pushed packet by packet with
//! [`HeadsetSimulator::push_samples`].

use crossbeam::channel::{bounded, Receiver};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::acquisition::channel::{ChannelFamily, ChannelLayout};
use crate::acquisition::frame::{encode_frame, SampleValue};
use crate::config::acquisition::AcquisitionSettings;
use crate::hal::protocol::decode_config;
use crate::hal::traits::{DisconnectReason, EventSink, Scanner, Transport, TransportError, TransportEvent};
use crate::hal::types::{
    BatteryInfo, BleDevice, ChargeLevel, ChargingSettings, ChargingState, DeviceInfo, DeviceModel,
    FullBatteryInfo, Version,
};
use crate::utils::time::sample_period_nanos;

/// How sample packets are produced while streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pacing {
    /// A background thread emits packets at the configured rate
    RealTime,
    /// Packets are emitted only through [`HeadsetSimulator::push_samples`]
    Manual,
}

/// One headset the simulator answers for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedDevice {
    pub name: String,
    pub address: String,
    pub model: DeviceModel,
    pub serial_number: u64,
    pub samples_per_packet: usize,
}

impl SimulatedDevice {
    pub fn new(name: impl Into<String>, model: DeviceModel) -> Self {
        let samples_per_packet = match model {
            DeviceModel::Halo | DeviceModel::HaloV2 => 10,
            _ => 5,
        };
        Self {
            name: name.into(),
            address: format!("00:1A:7D:DA:71:{:02X}", model.code()),
            model,
            serial_number: 0x0BA0_0000 + u64::from(model.code()),
            samples_per_packet,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub devices: Vec<SimulatedDevice>,
    pub pacing: Pacing,
    /// Answer configuration writes during a stream with an error
    pub reject_config_while_streaming: bool,
    pub signal_amplitude_uv: f64,
    pub noise_level_uv: f64,
    /// Bytes per firmware update progress step
    pub update_chunk_bytes: u64,
    pub battery_level: u8,
    pub seed: u64,
}

impl SimulatorConfig {
    /// Configuration with a single device of the given model
    pub fn with_model(model: DeviceModel) -> Self {
        Self {
            devices: vec![SimulatedDevice::new(format!("BA {} SIM", model.code()), model)],
            ..Self::default()
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            devices: vec![SimulatedDevice::new("BA MINI SIM", DeviceModel::MiniV2)],
            pacing: Pacing::RealTime,
            reject_config_while_streaming: true,
            signal_amplitude_uv: 50.0,
            noise_level_uv: 5.0,
            update_chunk_bytes: 4096,
            battery_level: 87,
            seed: 0x5EED,
        }
    }
}

/// Produces encoded sample frames for one stream session
struct SignalGenerator {
    layout: ChannelLayout,
    rate_hz: f64,
    counter: u64,
    amplitude: f64,
    noise: f64,
    rng: StdRng,
}

impl SignalGenerator {
    fn new(settings: &AcquisitionSettings, config: &SimulatorConfig) -> Self {
        Self {
            layout: settings.layout(),
            rate_hz: f64::from(settings.stream_rate.hz()),
            counter: 0,
            amplitude: config.signal_amplitude_uv,
            noise: config.noise_level_uv,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    fn packet(&mut self, frames: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(frames * self.layout.frame_len());
        let mut values = Vec::with_capacity(self.layout.len());

        for _ in 0..frames {
            values.clear();
            let t = self.counter as f64 / self.rate_hz;
            for &ch in self.layout.channels() {
                let value = match ch.family() {
                    Some((ChannelFamily::SampleNumber, _)) => SampleValue::Unsigned(self.counter),
                    Some((ChannelFamily::ElectrodeMeasurement, index)) => {
                        let tone = 2.0 * std::f64::consts::PI * (8.0 + f64::from(index)) * t;
                        let noise = (self.rng.gen::<f64>() - 0.5) * 2.0 * self.noise;
                        SampleValue::Double(self.amplitude * tone.sin() + noise)
                    }
                    Some((ChannelFamily::Accelerometer, 2)) => SampleValue::Float(1.0),
                    Some((ChannelFamily::Gyroscope | ChannelFamily::Accelerometer, _)) => {
                        SampleValue::Float((self.rng.gen::<f32>() - 0.5) * 0.02)
                    }
                    Some((ChannelFamily::DigitalInput, _)) => SampleValue::Bool(false),
                    Some(_) => SampleValue::Bool(true),
                    None => continue,
                };
                values.push(value);
            }
            if let Err(err) = encode_frame(&self.layout, &values, &mut out) {
                warn!(error = %err, "simulator produced an invalid frame");
                break;
            }
            self.counter += 1;
        }
        out
    }
}

struct Streamer {
    generator: Arc<Mutex<SignalGenerator>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Streamer {
    fn halt(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("simulator stream thread panicked");
            }
        }
    }
}

struct Link {
    sink: EventSink,
    device: SimulatedDevice,
    streamer: Option<Streamer>,
}

/// In-process headset implementing [`Transport`] and [`Scanner`]
pub struct HeadsetSimulator {
    config: SimulatorConfig,
    link: Mutex<Option<Link>>,
    device_settings: Mutex<Option<AcquisitionSettings>>,
    charging: Mutex<ChargingSettings>,
    calls: Mutex<Vec<&'static str>>,
}

impl HeadsetSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            link: Mutex::new(None),
            device_settings: Mutex::new(None),
            charging: Mutex::new(ChargingSettings::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn device_names(&self) -> Vec<String> {
        self.config.devices.iter().map(|d| d.name.clone()).collect()
    }

    pub fn is_linked(&self) -> bool {
        self.link.lock().is_some()
    }

    pub fn is_streaming(&self) -> bool {
        self.link.lock().as_ref().is_some_and(|link| link.streamer.is_some())
    }

    /// Configuration most recently accepted by the device
    pub fn device_settings(&self) -> Option<AcquisitionSettings> {
        self.device_settings.lock().clone()
    }

    pub fn charging_settings(&self) -> ChargingSettings {
        *self.charging.lock()
    }

    /// Transport calls received so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|call| **call == name).count()
    }

    /// Emit `packets` sample packets of `samples_per_packet` frames each; returns frames sent
    pub fn push_samples(&self, packets: usize) -> usize {
        let Some((sink, generator, frames)) = self.stream_handles() else {
            return 0;
        };
        let mut sent = 0;
        for _ in 0..packets {
            let packet = generator.lock().packet(frames);
            if !sink.emit(TransportEvent::Samples(packet)) {
                break;
            }
            sent += frames;
        }
        sent
    }

    /// Emit arbitrary bytes as a sample packet
    pub fn push_raw_packet(&self, packet: Vec<u8>) -> bool {
        self.sink().is_some_and(|sink| sink.emit(TransportEvent::Samples(packet)))
    }

    pub fn push_battery(&self, info: BatteryInfo) -> bool {
        self.sink().is_some_and(|sink| sink.emit(TransportEvent::Battery(info)))
    }

    /// Lose the link as if the device went away
    pub fn drop_link(&self, reason: DisconnectReason) {
        let Some(mut link) = self.link.lock().take() else {
            return;
        };
        if let Some(streamer) = link.streamer.take() {
            streamer.halt();
        }
        debug!(device = %link.device.name, ?reason, "simulated link lost");
        link.sink.emit(TransportEvent::Disconnected(reason));
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }

    fn sink(&self) -> Option<EventSink> {
        self.link.lock().as_ref().map(|link| link.sink.clone())
    }

    fn stream_handles(&self) -> Option<(EventSink, Arc<Mutex<SignalGenerator>>, usize)> {
        let guard = self.link.lock();
        let link = guard.as_ref()?;
        let streamer = link.streamer.as_ref()?;
        Some((link.sink.clone(), streamer.generator.clone(), link.device.samples_per_packet))
    }

    fn device_info(device: &SimulatedDevice) -> DeviceInfo {
        DeviceInfo {
            model: device.model,
            hardware_version: Version::new(1, 2, 0),
            firmware_version: Version::new(2, 1, 7),
            serial_number: device.serial_number,
            samples_per_packet: device.samples_per_packet,
        }
    }

    fn battery(&self) -> BatteryInfo {
        BatteryInfo {
            level: self.config.battery_level,
            is_charger_connected: false,
            is_charging: false,
        }
    }

    fn full_battery(&self) -> FullBatteryInfo {
        let level = self.config.battery_level;
        FullBatteryInfo {
            is_charger_connected: false,
            level,
            health: 98.0,
            voltage: 3.3 + 0.9 * f32::from(level) / 100.0,
            current: -0.045,
            charging_state: ChargingState::DischargingActive,
            charge_level: match level {
                0..=5 => ChargeLevel::Critical,
                6..=20 => ChargeLevel::Low,
                _ => ChargeLevel::Good,
            },
        }
    }

    fn spawn_pacer(
        sink: EventSink,
        generator: Arc<Mutex<SignalGenerator>>,
        stop: Arc<AtomicBool>,
        go: Receiver<()>,
        frames: usize,
        rate_hz: u32,
    ) -> std::io::Result<JoinHandle<()>> {
        let period = Duration::from_nanos(sample_period_nanos(rate_hz) * frames as u64);
        thread::Builder::new()
            .name("headset-simulator".to_string())
            .spawn(move || {
                if go.recv().is_err() {
                    return;
                }
                let mut deadline = Instant::now() + period;
                while !stop.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                        continue;
                    }
                    let packet = generator.lock().packet(frames);
                    if !sink.emit(TransportEvent::Samples(packet)) {
                        break;
                    }
                    deadline += period;
                }
                trace!("simulator pacer stopped");
            })
    }
}

impl Default for HeadsetSimulator {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl Transport for HeadsetSimulator {
    fn connect(&self, device_name: &str, sink: EventSink) -> Result<(), TransportError> {
        self.record("connect");
        let device = self.config.devices.iter().find(|d| d.name == device_name).cloned();

        let Some(device) = device else {
            sink.emit(TransportEvent::Connected(Err(TransportError::DeviceNotFound(
                device_name.to_string(),
            ))));
            return Ok(());
        };

        let previous = self.link.lock().replace(Link {
            sink: sink.clone(),
            device: device.clone(),
            streamer: None,
        });
        if let Some(streamer) = previous.and_then(|link| link.streamer) {
            streamer.halt();
        }

        debug!(device = %device.name, model = %device.model, "simulated handshake");
        sink.emit(TransportEvent::Connected(Ok(Self::device_info(&device))));
        if device.model.is_supported() {
            sink.emit(TransportEvent::Battery(self.battery()));
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.record("disconnect");
        let link = self.link.lock().take();
        if let Some(streamer) = link.and_then(|link| link.streamer) {
            streamer.halt();
        }
        Ok(())
    }

    fn write_config(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.record("write_config");
        let (sink, streaming) = {
            let guard = self.link.lock();
            let link = guard.as_ref().ok_or(TransportError::NotConnected)?;
            (link.sink.clone(), link.streamer.is_some())
        };

        let outcome = if streaming && self.config.reject_config_while_streaming {
            Err(TransportError::Rejected {
                operation: "write config",
                reason: "device is streaming".to_string(),
            })
        } else {
            decode_config(&payload)
                .map(|settings| {
                    *self.device_settings.lock() = Some(settings);
                })
                .map_err(|err| TransportError::Rejected {
                    operation: "write config",
                    reason: err.to_string(),
                })
        };

        sink.emit(TransportEvent::ConfigWritten(outcome));
        Ok(())
    }

    fn start_stream(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.record("start_stream");
        let mut guard = self.link.lock();
        let link = guard.as_mut().ok_or(TransportError::NotConnected)?;
        if link.streamer.is_some() {
            return Err(TransportError::Busy("stream"));
        }
        let sink = link.sink.clone();

        let settings = match decode_config(&payload) {
            Ok(settings) => settings,
            Err(err) => {
                drop(guard);
                sink.emit(TransportEvent::StreamStarted(Err(TransportError::Rejected {
                    operation: "start stream",
                    reason: err.to_string(),
                })));
                return Ok(());
            }
        };

        let generator = Arc::new(Mutex::new(SignalGenerator::new(&settings, &self.config)));
        let stop = Arc::new(AtomicBool::new(false));
        let frames = link.device.samples_per_packet;
        let rate = settings.stream_rate;

        // The pacer holds its first packet until the acknowledgement is queued.
        let (go_tx, go_rx) = bounded(1);
        let thread = match self.config.pacing {
            Pacing::RealTime => Some(
                Self::spawn_pacer(sink.clone(), generator.clone(), stop.clone(), go_rx, frames, rate.hz())
                    .map_err(|err| TransportError::Io(err.to_string()))?,
            ),
            Pacing::Manual => None,
        };

        *self.device_settings.lock() = Some(settings);
        sink.emit(TransportEvent::StreamStarted(Ok(())));
        let _ = go_tx.send(());

        link.streamer = Some(Streamer {
            generator,
            stop,
            thread,
        });
        debug!(%rate, frames, "simulated stream started");
        Ok(())
    }

    fn stop_stream(&self) -> Result<(), TransportError> {
        self.record("stop_stream");
        let (sink, streamer) = {
            let mut guard = self.link.lock();
            let link = guard.as_mut().ok_or(TransportError::NotConnected)?;
            (link.sink.clone(), link.streamer.take())
        };

        if let Some(streamer) = streamer {
            streamer.halt();
        }
        sink.emit(TransportEvent::StreamStopped(Ok(())));
        Ok(())
    }

    fn request_full_battery(&self) -> Result<(), TransportError> {
        self.record("request_full_battery");
        let sink = self.sink().ok_or(TransportError::NotConnected)?;
        sink.emit(TransportEvent::FullBattery(self.full_battery()));
        Ok(())
    }

    fn set_charging_settings(&self, settings: ChargingSettings) -> Result<(), TransportError> {
        self.record("set_charging_settings");
        if !self.is_linked() {
            return Err(TransportError::NotConnected);
        }
        *self.charging.lock() = settings;
        Ok(())
    }

    fn start_update(&self, image: &Path) -> Result<(), TransportError> {
        self.record("start_update");
        let sink = {
            let guard = self.link.lock();
            let link = guard.as_ref().ok_or(TransportError::NotConnected)?;
            if link.streamer.is_some() {
                return Err(TransportError::Busy("stream"));
            }
            link.sink.clone()
        };

        let total = std::fs::metadata(image)
            .map_err(|err| TransportError::Io(err.to_string()))?
            .len();
        let step = self.config.update_chunk_bytes.max(1);

        let mut sent = 0;
        while sent < total {
            sent = (sent + step).min(total);
            if !sink.emit(TransportEvent::UpdateProgress { sent, total }) {
                return Ok(());
            }
        }
        let outcome = if total == 0 {
            Err(TransportError::Rejected {
                operation: "update",
                reason: "empty firmware image".to_string(),
            })
        } else {
            Ok(())
        };
        sink.emit(TransportEvent::UpdateFinished(outcome));
        Ok(())
    }
}

impl Scanner for HeadsetSimulator {
    fn scan(&self, adapter_index: u8) -> Result<Vec<BleDevice>, TransportError> {
        self.record("scan");
        trace!(adapter_index, "simulated scan");
        Ok(self
            .config
            .devices
            .iter()
            .map(|device| BleDevice {
                name: device.name.clone(),
                address: device.address.clone(),
            })
            .collect())
    }
}

impl Drop for HeadsetSimulator {
    fn drop(&mut self) {
        if let Some(streamer) = self.link.get_mut().take().and_then(|link| link.streamer) {
            streamer.halt();
        }
    }
}
