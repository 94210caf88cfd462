// tests/annotations.rs
//! Sample-indexed annotations and the calibration window

mod common;

use common::{Fixture, WAIT};
use eeg_manager::hal::Pacing;
use eeg_manager::utils::{MockTimeProvider, TimeProvider};
use eeg_manager::{CoreConfig, DeviceModel, EegError};
use serial_test::serial;
use std::sync::Arc;

fn fixture(chunk_size: usize) -> (Fixture, Arc<MockTimeProvider>) {
    let clock = Arc::new(MockTimeProvider::new(1_000_000_000));
    let config = CoreConfig {
        chunk_size,
        ..CoreConfig::default()
    };
    let time: Arc<dyn TimeProvider> = clock.clone();
    let fx = Fixture::with_config(config, DeviceModel::MiniV2, Pacing::Manual, Some(time));
    (fx, clock)
}

#[test]
#[serial]
fn test_annotate_requires_running_stream() {
    let (mut fx, _clock) = fixture(25);
    assert_eq!(fx.manager.annotate("too early").unwrap_err(), EegError::NotConnected);

    fx.connect();
    assert!(matches!(
        fx.manager.annotate("idle"),
        Err(EegError::InvalidState { operation: "annotate", .. })
    ));
    assert!(fx.manager.get_annotations().is_empty());
}

#[test]
#[serial]
fn test_calibration_window() {
    let (mut fx, clock) = fixture(25);
    fx.connect();
    fx.start();

    let err = fx.manager.annotate("blink").unwrap_err();
    assert_eq!(err, EegError::AnnotationCalibrating);
    assert!(err.is_transient());

    clock.advance_millis(499);
    assert_eq!(fx.manager.annotate("blink").unwrap_err(), EegError::AnnotationCalibrating);

    clock.advance_millis(1);
    fx.manager.annotate("blink").unwrap();
    assert_eq!(fx.manager.get_annotations().len(), 1);
}

#[test]
#[serial]
fn test_timestamps_follow_sample_index() {
    let (mut fx, clock) = fixture(10);
    let chunks = fx.record_chunks();
    fx.connect();
    fx.start();
    clock.advance_millis(600);

    fx.manager.annotate("start").unwrap();
    fx.sim.push_samples(2);
    chunks.recv_timeout(WAIT).unwrap();
    fx.manager.annotate("after ten").unwrap();
    fx.manager.annotate("same sample").unwrap();

    let annotations = fx.manager.get_annotations();
    let stamps: Vec<(u64, &str)> = annotations
        .iter()
        .map(|a| (a.timestamp, a.text.as_str()))
        .collect();
    assert_eq!(stamps, vec![(0, "start"), (10, "after ten"), (10, "same sample")]);
}

#[test]
#[serial]
fn test_annotations_cleared_on_disconnect() {
    let (mut fx, clock) = fixture(25);
    fx.connect();
    fx.start();
    clock.advance_millis(1_000);
    fx.manager.annotate("one").unwrap();
    fx.manager.annotate("two").unwrap();

    fx.manager.clear_annotations();
    assert!(fx.manager.get_annotations().is_empty());

    fx.manager.annotate("three").unwrap();
    fx.manager.disconnect();
    assert!(fx.manager.get_annotations().is_empty());
}
