// src/manager/worker.rs
//! Per-manager worker thread
//!
//! Drives every asynchronous completion and push callback of one manager.
//! Events are handled strictly in arrival order; events tagged with an
//! outdated connection session are discarded.

use crossbeam::channel::Receiver;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

use crate::acquisition::assembler::ChunkAssembler;
use crate::error::{EegError, EegResult, IntoEegError};
use crate::hal::traits::{DisconnectReason, Transport, TransportError, TransportEvent};
use crate::hal::types::{DeviceFeatures, DeviceInfo};
use crate::manager::callbacks::PendingRequests;
use crate::manager::state::{ManagerState, StreamState};
use crate::manager::{ConnectedDevice, ManagerShared};

pub(crate) enum WorkerEvent {
    /// Event from the transport, tagged with the session it belongs to
    Transport { session: u64, event: TransportEvent },
    /// A requested disconnect finished on the caller's thread
    DisconnectNotice { pending: PendingRequests, notify: bool },
    Shutdown,
}

impl fmt::Debug for WorkerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerEvent::Transport { session, event } => f
                .debug_struct("Transport")
                .field("session", session)
                .field("event", event)
                .finish(),
            WorkerEvent::DisconnectNotice { pending, notify } => f
                .debug_struct("DisconnectNotice")
                .field("pending", pending)
                .field("notify", notify)
                .finish(),
            WorkerEvent::Shutdown => f.write_str("Shutdown"),
        }
    }
}

pub(crate) struct Worker {
    shared: Arc<ManagerShared>,
    transport: Arc<dyn Transport>,
    assembler: Option<ChunkAssembler>,
}

impl Worker {
    pub(crate) fn spawn(
        shared: Arc<ManagerShared>,
        transport: Arc<dyn Transport>,
        events: Receiver<WorkerEvent>,
    ) -> EegResult<JoinHandle<()>> {
        let worker = Worker {
            shared,
            transport,
            assembler: None,
        };
        thread::Builder::new()
            .name("eeg-manager-worker".to_string())
            .spawn(move || worker.run(events))
            .eeg_err("spawn manager worker")
    }

    fn run(mut self, events: Receiver<WorkerEvent>) {
        debug!("manager worker started");
        while let Ok(event) = events.recv() {
            match event {
                WorkerEvent::Shutdown => break,
                WorkerEvent::DisconnectNotice { pending, notify } => {
                    self.assembler = None;
                    pending.fail_all(EegError::NotConnected);
                    if notify {
                        self.shared.callbacks.notify_disconnect(DisconnectReason::Requested);
                    }
                }
                WorkerEvent::Transport { session, event } => {
                    let current = self.shared.current_session();
                    if session != current {
                        trace!(session, current, "discarding event from a previous session");
                        continue;
                    }
                    self.handle(event);
                }
            }
        }
        debug!("manager worker stopped");
    }

    fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Samples(packet) => self.on_samples(&packet),
            TransportEvent::Connected(result) => self.on_connected(result),
            TransportEvent::ConfigWritten(result) => self.on_config_written(result),
            TransportEvent::StreamStarted(result) => self.on_stream_started(result),
            TransportEvent::StreamStopped(result) => self.on_stream_stopped(result),
            TransportEvent::Battery(info) => {
                *self.shared.battery.write() = info;
                self.shared.callbacks.notify_battery(&info);
            }
            TransportEvent::FullBattery(info) => {
                *self.shared.full_battery.write() = info;
                let waiting = std::mem::take(&mut self.shared.pending.lock().full_battery);
                for done in waiting {
                    done(Ok(info));
                }
            }
            TransportEvent::UpdateProgress { sent, total } => {
                if let Some(update) = self.shared.pending.lock().update.as_mut() {
                    (update.on_progress)(sent, total);
                }
            }
            TransportEvent::UpdateFinished(result) => {
                let update = self.shared.pending.lock().update.take();
                match update {
                    Some(update) => {
                        info!(success = result.is_ok(), "firmware update finished");
                        (update.on_done)(result.map_err(|e| EegError::UpdateFailed(e.to_string())));
                    }
                    None => warn!("update result without a pending update"),
                }
            }
            TransportEvent::Disconnected(reason) => self.on_link_lost(reason),
        }
    }

    fn on_samples(&mut self, packet: &[u8]) {
        let Some(assembler) = self.assembler.as_mut() else {
            trace!(len = packet.len(), "sample packet outside a stream session");
            return;
        };

        let mut consumer = self.shared.callbacks.chunk.lock();
        let result = assembler.push_packet(packet, |chunk| {
            if let Some(callback) = consumer.as_mut() {
                callback(chunk);
            }
        });
        drop(consumer);

        if result.is_err() {
            self.shared.frames_malformed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_connected(&mut self, result: Result<DeviceInfo, TransportError>) {
        let done = self.shared.pending.lock().connect.take();
        let mut state = self.shared.state.lock();
        if *state != ManagerState::Connecting {
            drop(state);
            debug!("handshake answer after the connect was abandoned");
            if let Some(done) = done {
                done(Err(EegError::NotConnected));
            }
            return;
        }

        let outcome = match result {
            Ok(info) if !info.model.is_supported() => {
                warn!(model = ?info.model, "rejecting unsupported device");
                if let Err(err) = self.transport.disconnect() {
                    debug!(error = %err, "disconnect after rejected handshake failed");
                }
                Err(EegError::Unsupported {
                    model: info.model,
                    what: "connection".to_string(),
                })
            }
            Ok(info) => {
                info!(
                    model = %info.model,
                    firmware = %info.firmware_version,
                    serial = info.serial_number,
                    "device connected"
                );
                *self.shared.device.write() = Some(ConnectedDevice {
                    features: DeviceFeatures::for_model(info.model),
                    info,
                });
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "connect failed");
                Err(err.into())
            }
        };

        state.finish_connect(outcome.is_ok());
        drop(state);
        if let Some(done) = done {
            done(outcome);
        }
    }

    fn on_config_written(&mut self, result: Result<(), TransportError>) {
        let Some((settings, done)) = self.shared.pending.lock().load_config.take() else {
            warn!("configuration answer without a pending write");
            return;
        };

        match result {
            Ok(()) => {
                debug!(rate = %settings.stream_rate, "configuration applied");
                *self.shared.applied.write() = Some(settings);
                done(Ok(()));
            }
            Err(err) => {
                warn!(error = %err, "configuration write failed, staged values kept");
                done(Err(err.into()));
            }
        }
    }

    fn on_stream_started(&mut self, result: Result<(), TransportError>) {
        let Some((settings, done)) = self.shared.pending.lock().start.take() else {
            warn!("stream start answer without a pending start");
            return;
        };

        let mut state = self.shared.state.lock();
        if *state != ManagerState::Connected(StreamState::Starting) {
            drop(state);
            debug!("stream start answer after the request was abandoned");
            done(Err(EegError::NotConnected));
            return;
        }

        if let Err(err) = result {
            warn!(error = %err, "stream start failed");
            state.finish_start(false);
            drop(state);
            done(Err(err.into()));
            return;
        }

        let layout = settings.layout();
        let chunk_size = self.shared.begin_stream_accounting();
        info!(
            rate = %settings.stream_rate,
            channels = layout.len(),
            chunk_size,
            "stream started"
        );

        self.shared.sample_index.store(0, Ordering::Release);
        *self.shared.stream_started_at_ms.lock() = Some(self.shared.time.now_millis());
        *self.shared.session_layout.write() = Some(Arc::new(layout.clone()));
        *self.shared.applied.write() = Some(settings);
        self.assembler = Some(ChunkAssembler::new(layout, chunk_size, self.shared.sample_index.clone()));
        state.finish_start(true);
        drop(state);
        done(Ok(()));
    }

    fn on_stream_stopped(&mut self, result: Result<(), TransportError>) {
        let Some(done) = self.shared.pending.lock().stop.take() else {
            warn!("stream stop answer without a pending stop");
            return;
        };

        let mut state = self.shared.state.lock();
        if *state != ManagerState::Connected(StreamState::Stopping) {
            drop(state);
            done(Err(EegError::NotConnected));
            return;
        }

        if let Err(err) = result {
            warn!(error = %err, "stream stop failed");
            state.finish_stop(false);
            drop(state);
            done(Err(err.into()));
            return;
        }

        if let Some(assembler) = self.assembler.take() {
            let stats = assembler.stats();
            info!(
                samples = stats.samples_assembled,
                chunks = stats.chunks_dispatched,
                discarded = assembler.pending(),
                "stream stopped"
            );
        }
        self.shared.end_stream_accounting();
        *self.shared.session_layout.write() = None;
        *self.shared.stream_started_at_ms.lock() = None;
        self.shared.staged.lock().reset();
        state.finish_stop(true);
        drop(state);
        done(Ok(()));
    }

    fn on_link_lost(&mut self, reason: DisconnectReason) {
        let Some(previous) = self.shared.state.lock().begin_disconnect() else {
            return;
        };

        warn!(?reason, state = %previous, "link lost");
        self.assembler = None;
        let pending = self.shared.teardown();
        pending.fail_all(EegError::link("connection", format!("{:?}", reason)));
        if previous.is_connected() {
            self.shared.callbacks.notify_disconnect(reason);
        }
    }
}
