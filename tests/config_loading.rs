// tests/config_loading.rs
//! Layered configuration feeding a core

use eeg_manager::config::{ConfigError, ConfigLoader};
use eeg_manager::{Core, CoreConfig, EegError};
use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn test_environment_overrides_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("eeg-manager.toml");
    std::fs::write(&path, "chunk_size = 40\nadapter_index = 1\n").unwrap();

    std::env::set_var("EEG_MANAGER_IT__CHUNK_SIZE", "60");
    let loaded = ConfigLoader::with_paths(vec![path])
        .with_env_prefix("EEG_MANAGER_IT")
        .load();
    std::env::remove_var("EEG_MANAGER_IT__CHUNK_SIZE");

    let config = loaded.unwrap();
    assert_eq!(config.chunk_size, 60);
    assert_eq!(config.adapter_index, 1);

    let core = Core::init(config).unwrap();
    assert_eq!(core.chunk_size(), 60);
}

#[test]
#[serial]
fn test_invalid_environment_value_rejected() {
    std::env::set_var("EEG_MANAGER_BAD__CHUNK_SIZE", "0");
    let loaded = ConfigLoader::with_paths(Vec::new())
        .with_env_prefix("EEG_MANAGER_BAD")
        .load();
    std::env::remove_var("EEG_MANAGER_BAD__CHUNK_SIZE");

    assert!(matches!(loaded, Err(ConfigError::Validation(_))));
}

#[test]
#[serial]
fn test_exported_config_initializes_core() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("exported.toml");
    let config = CoreConfig {
        chunk_size: 75,
        annotation_settle_ms: 1_000,
        update_path: Some(dir.path().join("fw.bin")),
        ..CoreConfig::default()
    };
    ConfigLoader::export_config(&config, &path).unwrap();

    let loaded = ConfigLoader::load_file(&path).unwrap();
    assert_eq!(loaded, config);

    let core = Core::init(loaded).unwrap();
    assert_eq!(core.config().update_path, config.update_path);
}

#[test]
#[serial]
fn test_core_rejects_invalid_config() {
    let config = CoreConfig {
        event_queue_capacity: 1,
        ..CoreConfig::default()
    };
    assert!(matches!(Core::init(config), Err(EegError::Config(_))));

    // The failed init left no core behind
    let core = Core::init(CoreConfig::default()).unwrap();
    drop(core);
}
