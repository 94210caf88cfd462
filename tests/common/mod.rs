// tests/common/mod.rs
//! Shared fixtures for the integration tests

#![allow(dead_code)]

use crossbeam::channel::{bounded, Receiver};
use eeg_manager::acquisition::Chunk;
use eeg_manager::hal::{HeadsetSimulator, Pacing, SimulatorConfig};
use eeg_manager::utils::TimeProvider;
use eeg_manager::{ChannelId, Core, CoreConfig, DeviceModel, EegManager, EegResult};
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(3);

/// Recorded copy of a delivered chunk
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub channels: Vec<ChannelId>,
    pub sample_numbers: Vec<u64>,
    pub len: usize,
}

impl ChunkRecord {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        let sample_numbers = chunk
            .column(ChannelId::SAMPLE_NUMBER)
            .and_then(|column| column.as_unsigned())
            .map(<[u64]>::to_vec)
            .unwrap_or_default();
        Self {
            channels: chunk.channels().to_vec(),
            sample_numbers,
            len: chunk.len(),
        }
    }
}

/// Manager wired to a simulated headset; fields drop in declaration order
pub struct Fixture {
    pub manager: EegManager,
    pub sim: Arc<HeadsetSimulator>,
    pub core: Core,
}

impl Fixture {
    pub fn new(model: DeviceModel, pacing: Pacing) -> Self {
        Self::with_config(CoreConfig::default(), model, pacing, None)
    }

    pub fn with_config(
        config: CoreConfig,
        model: DeviceModel,
        pacing: Pacing,
        time: Option<Arc<dyn TimeProvider>>,
    ) -> Self {
        let core = Core::init(config).expect("core init");
        let sim = Arc::new(HeadsetSimulator::new(SimulatorConfig {
            pacing,
            ..SimulatorConfig::with_model(model)
        }));
        let mut builder = EegManager::builder(&core, sim.clone());
        if let Some(time) = time {
            builder = builder.time_provider(time);
        }
        let manager = builder.build().expect("manager");
        Self { core, sim, manager }
    }

    pub fn device_name(&self) -> String {
        self.sim.device_names()[0].clone()
    }

    pub fn connect(&mut self) {
        let name = self.device_name();
        let (done, rx) = completion();
        self.manager.connect(&name, done).expect("connect accepted");
        wait(&rx).expect("connect completed");
    }

    pub fn start(&mut self) {
        let (done, rx) = completion();
        self.manager.start_stream(done).expect("start accepted");
        wait(&rx).expect("stream started");
    }

    pub fn stop(&mut self) {
        let (done, rx) = completion();
        self.manager.stop_stream(done).expect("stop accepted");
        wait(&rx).expect("stream stopped");
    }

    /// Route delivered chunks into a channel
    pub fn record_chunks(&mut self) -> Receiver<ChunkRecord> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.manager.set_chunk_callback(move |chunk| {
            let _ = tx.send(ChunkRecord::from_chunk(chunk));
        });
        rx
    }

    /// Leave only the sample counter and the first `electrodes` electrodes enabled
    pub fn enable_only_electrodes(&mut self, electrodes: u16) {
        let channels = self.manager.get_device_features().expect("features").channels();
        for ch in channels {
            let keep = ch == ChannelId::SAMPLE_NUMBER || (1..=electrodes).contains(&ch.0);
            self.manager.set_channel_enabled(ch, keep).expect("channel toggle");
        }
    }
}

pub fn completion<T: Send + 'static>() -> (impl FnOnce(EegResult<T>) + Send + 'static, Receiver<EegResult<T>>) {
    let (tx, rx) = bounded(1);
    (
        move |result: EegResult<T>| {
            let _ = tx.send(result);
        },
        rx,
    )
}

pub fn wait<T>(rx: &Receiver<EegResult<T>>) -> EegResult<T> {
    rx.recv_timeout(WAIT).expect("completion not delivered in time")
}

/// Block until `check` holds or the timeout expires
pub fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + WAIT;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}
