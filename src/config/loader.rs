// src/config/loader.rs
//! Layered loading of [`CoreConfig`]
//!
//! Sources in increasing precedence: the system file, the user file, the
//! local file, then `EEG_MANAGER__*` environment variables
//! (`EEG_MANAGER__CHUNK_SIZE=50`). Missing files are skipped.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::constants::paths;
use crate::config::CoreConfig;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("configuration parse error: {0}")]
    Parse(String),

    #[error("configuration validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<::config::ConfigError> for ConfigError {
    fn from(err: ::config::ConfigError) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Loads, validates and exports [`CoreConfig`]
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Loader over the standard search paths
    pub fn new() -> Self {
        Self::with_paths(Self::discover_config_paths())
    }

    /// Loader over custom paths, lowest precedence first
    pub fn with_paths(config_paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths,
            env_prefix: paths::ENV_PREFIX.to_string(),
        }
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }

    /// Merge every source and validate the result
    pub fn load(&self) -> Result<CoreConfig, ConfigError> {
        let mut builder = ::config::Config::builder();

        for path in &self.config_paths {
            debug!(path = %path.display(), exists = path.exists(), "configuration source");
            builder = builder.add_source(
                ::config::File::from(path.as_path())
                    .format(::config::FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator(paths::ENV_SEPARATOR)
                .separator(paths::ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: CoreConfig = builder.build()?.try_deserialize()?;
        config.validate().map_err(ConfigError::Validation)?;

        info!(chunk_size = config.chunk_size, "core configuration loaded");
        Ok(config)
    }

    /// Load a single TOML file without environment overrides
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<CoreConfig, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: CoreConfig = toml::from_str(&content)?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Write `config` as TOML
    pub fn export_config<P: AsRef<Path>>(config: &CoreConfig, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(config).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn discover_config_paths() -> Vec<PathBuf> {
        let mut search = vec![Path::new(paths::SYSTEM_CONFIG_DIR).join(paths::CONFIG_FILE_NAME)];

        if let Some(home) = home_dir() {
            search.push(home.join(".config").join("eeg-manager").join(paths::CONFIG_FILE_NAME));
        }

        search.push(PathBuf::from(paths::CONFIG_FILE_NAME));
        search
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("USERPROFILE").map(PathBuf::from)
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("HOME").map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let loader = ConfigLoader::with_paths(vec![dir.path().join("absent.toml")])
            .with_env_prefix("EEG_MANAGER_UNIT_DEFAULTS");
        assert_eq!(loader.load().unwrap(), CoreConfig::default());
    }

    #[test]
    fn test_later_files_take_precedence() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.toml");
        let local = dir.path().join("local.toml");
        std::fs::write(&base, "chunk_size = 10\nannotation_settle_ms = 250\n").unwrap();
        std::fs::write(&local, "chunk_size = 40\n").unwrap();

        let config = ConfigLoader::with_paths(vec![base, local])
            .with_env_prefix("EEG_MANAGER_UNIT_LAYERS")
            .load()
            .unwrap();
        assert_eq!(config.chunk_size, 40);
        assert_eq!(config.annotation_settle_ms, 250);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "chunk_size = 500\n").unwrap();

        assert!(matches!(
            ConfigLoader::load_file(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_export_then_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.toml");
        let config = CoreConfig {
            chunk_size: 64,
            update_path: Some(dir.path().join("fw.bin")),
            ..CoreConfig::default()
        };

        ConfigLoader::export_config(&config, &path).unwrap();
        assert_eq!(ConfigLoader::load_file(&path).unwrap(), config);
    }

    #[test]
    fn test_load_file_missing() {
        assert!(matches!(
            ConfigLoader::load_file("/nonexistent/eeg-manager.toml"),
            Err(ConfigError::FileNotFound(_))
        ));
    }
}
