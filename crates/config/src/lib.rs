//! Configuration management for the reader
//!
//! Supports loading configuration from:
//! - YAML/TOML/JSON files under `config/`
//! - Environment variables (LISTEN__ prefix)

pub mod playback;
pub mod settings;

pub use playback::{LocalEngineConfig, LocalVoiceEntry, PlaybackConfig, RemoteVoiceConfig};
pub use settings::{
    load_settings, load_settings_from, ObservabilityConfig, Settings, StorageConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
