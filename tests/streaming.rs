// tests/streaming.rs
//! Streaming state machine, chunk delivery and configuration pushes

mod common;

use common::{completion, eventually, wait, Fixture, WAIT};
use eeg_manager::hal::Pacing;
use eeg_manager::{
    ChannelId, CoreConfig, DeviceModel, EegError, GainMode, ManagerState, StreamRate, StreamState, WireType,
};
use serial_test::serial;
use std::time::{Duration, Instant};

#[test]
#[serial]
fn test_chunks_follow_layout_and_sample_order() {
    let mut fx = Fixture::new(DeviceModel::MiniV2, Pacing::Manual);
    let chunks = fx.record_chunks();
    fx.connect();
    fx.enable_only_electrodes(4);

    assert_eq!(fx.manager.get_channel_index(ChannelId::SAMPLE_NUMBER), Some(0));
    assert_eq!(fx.manager.get_channel_index(ChannelId::electrode(3)), Some(4));
    assert_eq!(fx.manager.get_channel_index(ChannelId::electrode(4)), None);

    fx.start();
    assert_eq!(
        fx.manager.stream_channel_types(),
        vec![WireType::Unsigned, WireType::Double, WireType::Double, WireType::Double, WireType::Double]
    );

    // 10 packets of 5 frames make exactly two chunks of 25
    assert_eq!(fx.sim.push_samples(10), 50);
    let first = chunks.recv_timeout(WAIT).unwrap();
    let second = chunks.recv_timeout(WAIT).unwrap();

    assert_eq!(first.len, 25);
    assert_eq!(first.channels, vec![
        ChannelId::SAMPLE_NUMBER,
        ChannelId::electrode(0),
        ChannelId::electrode(1),
        ChannelId::electrode(2),
        ChannelId::electrode(3),
    ]);
    assert_eq!(first.sample_numbers, (0..25).collect::<Vec<u64>>());
    assert_eq!(second.sample_numbers, (25..50).collect::<Vec<u64>>());
    assert!(chunks.try_recv().is_err());
}

#[test]
#[serial]
fn test_stop_discards_partial_chunk_and_resets_staged_config() {
    let mut fx = Fixture::new(DeviceModel::MiniV2, Pacing::Manual);
    let chunks = fx.record_chunks();
    fx.connect();
    fx.enable_only_electrodes(2);
    fx.manager.set_channel_gain(ChannelId::electrode(0), GainMode::X2).unwrap();
    fx.start();

    fx.sim.push_samples(3);
    fx.stop();
    assert!(chunks.try_recv().is_err());
    assert_eq!(fx.manager.state(), ManagerState::Connected(StreamState::Idle));

    // Staged settings are back to defaults: every channel enabled again
    assert!(fx.manager.get_channel_index(ChannelId::electrode(5)).is_some());
    fx.start();
    let applied = fx.sim.device_settings().unwrap();
    assert_eq!(applied.channels[&ChannelId::electrode(0)].gain, GainMode::X8);
    assert!(applied.channels[&ChannelId::electrode(5)].enabled);
}

#[test]
#[serial]
fn test_duplicate_and_out_of_order_requests() {
    let mut fx = Fixture::new(DeviceModel::Midi, Pacing::Manual);
    fx.connect();

    assert!(matches!(fx.manager.stop_stream(|_| {}), Err(EegError::InvalidState { .. })));
    fx.start();
    assert!(matches!(fx.manager.start_stream(|_| {}), Err(EegError::InvalidState { .. })));
    assert_eq!(fx.sim.call_count("start_stream"), 1);

    fx.stop();
    assert!(matches!(fx.manager.stop_stream(|_| {}), Err(EegError::InvalidState { .. })));
    assert_eq!(fx.sim.call_count("stop_stream"), 1);
}

#[test]
#[serial]
fn test_load_config_idle_and_while_streaming() {
    let mut fx = Fixture::new(DeviceModel::MiniV2, Pacing::Manual);
    fx.connect();
    fx.manager.set_channel_enabled(ChannelId::electrode(7), false).unwrap();

    let (done, rx) = completion();
    fx.manager.load_config(done).unwrap();
    wait(&rx).unwrap();
    let applied = fx.sim.device_settings().unwrap();
    assert!(!applied.channels[&ChannelId::electrode(7)].enabled);

    fx.start();
    let (done, rx) = completion();
    fx.manager.load_config(done).unwrap();
    assert!(matches!(wait(&rx), Err(EegError::Link { .. })));

    // The running session keeps the layout it started with
    assert_eq!(fx.manager.get_channel_index(ChannelId::electrode(7)), None);
    assert!(fx.manager.is_streaming());
}

#[test]
#[serial]
fn test_rate_validation_across_connection_states() {
    let mut fx = Fixture::new(DeviceModel::MiniV2, Pacing::Manual);

    // Disconnected: accepted and checked at push time
    fx.manager.set_data_stream_rate(StreamRate::Hz1000).unwrap();
    fx.connect();
    assert!(matches!(fx.manager.start_stream(|_| {}), Err(EegError::Unsupported { .. })));
    assert_eq!(fx.manager.state(), ManagerState::Connected(StreamState::Idle));
    assert_eq!(fx.sim.call_count("start_stream"), 0);

    fx.manager.set_data_stream_rate_hz(500).unwrap();
    fx.start();
    assert_eq!(fx.manager.get_sample_frequency(), 500);
}

#[test]
#[serial]
fn test_malformed_packet_dropped() {
    let mut fx = Fixture::new(DeviceModel::MiniV2, Pacing::Manual);
    let chunks = fx.record_chunks();
    fx.connect();
    fx.enable_only_electrodes(1);
    fx.start();

    assert!(fx.sim.push_raw_packet(vec![1, 2, 3]));
    fx.sim.push_samples(5);
    let chunk = chunks.recv_timeout(WAIT).unwrap();

    assert_eq!(chunk.sample_numbers[0], 0);
    assert_eq!(fx.manager.frames_malformed(), 1);
    assert_eq!(fx.manager.frames_dropped(), 0);
}

#[test]
#[serial]
fn test_chunk_size_locked_while_streaming() {
    let config = CoreConfig {
        chunk_size: 10,
        ..CoreConfig::default()
    };
    let mut fx = Fixture::with_config(config, DeviceModel::Halo, Pacing::Manual, None);
    let chunks = fx.record_chunks();
    fx.connect();
    fx.start();

    assert!(matches!(fx.core.set_chunk_size(50), Err(EegError::InvalidState { .. })));
    fx.sim.push_samples(1);
    assert_eq!(chunks.recv_timeout(WAIT).unwrap().len, 10);

    fx.stop();
    fx.core.set_chunk_size(50).unwrap();
    assert_eq!(fx.core.chunk_size(), 50);
}

#[test]
#[serial]
fn test_real_time_pacing() {
    let mut fx = Fixture::new(DeviceModel::MiniV2, Pacing::RealTime);
    let chunks = fx.record_chunks();
    fx.connect();
    fx.enable_only_electrodes(4);

    let started = Instant::now();
    fx.start();
    let mut expected = 0u64;
    for _ in 0..3 {
        let chunk = chunks.recv_timeout(WAIT).unwrap();
        assert_eq!(chunk.len, 25);
        assert_eq!(chunk.sample_numbers.first(), Some(&expected));
        expected += 25;
    }

    // 75 samples at 250 Hz take 300 ms
    assert!(started.elapsed() >= Duration::from_millis(250));
    fx.stop();
    assert!(eventually(|| !fx.sim.is_streaming()));
}
