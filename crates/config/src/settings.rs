//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use listen_core::voice::{MAX_PITCH, MAX_RATE, MIN_PITCH, MIN_RATE};
use listen_core::SESSION_KEY;

use crate::{ConfigError, LocalEngineConfig, PlaybackConfig, RemoteVoiceConfig};

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Playback defaults
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// On-device engine
    #[serde(default)]
    pub local: LocalEngineConfig,

    /// Remote AI voices
    #[serde(default)]
    pub remote: RemoteVoiceConfig,

    /// Progress storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.playback.chunk_size == 0 {
            return Err(invalid("playback.chunk_size", "must be a positive integer"));
        }

        if !(MIN_RATE..=MAX_RATE).contains(&self.playback.rate) {
            return Err(invalid(
                "playback.rate",
                &format!("must be within [{}, {}]", MIN_RATE, MAX_RATE),
            ));
        }

        if !(MIN_PITCH..=MAX_PITCH).contains(&self.playback.pitch) {
            return Err(invalid(
                "playback.pitch",
                &format!("must be within [{}, {}]", MIN_PITCH, MAX_PITCH),
            ));
        }

        let pace = self.local.chars_per_second;
        if !pace.is_finite() || pace <= 0.0 {
            return Err(invalid("local.chars_per_second", "must be positive"));
        }

        if self.remote.enabled && self.remote.synthesis_url.trim().is_empty() {
            return Err(invalid("remote.synthesis_url", "required when remote voices are enabled"));
        }

        if self.storage.session_key.trim().is_empty() {
            return Err(invalid("storage.session_key", "must not be empty"));
        }

        if self.local.voices.is_empty() {
            tracing::warn!("No local voices configured, the engine default voice will be used");
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Progress storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding session records
    #[serde(default = "default_storage_dir")]
    pub dir: String,

    /// Key of the session record
    #[serde(default = "default_session_key")]
    pub session_key: String,
}

fn default_storage_dir() -> String {
    ".listen".to_string()
}

fn default_session_key() -> String {
    SESSION_KEY.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            session_key: default_session_key(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from `config/` and the environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (LISTEN__ prefix, `__` separated)
/// 2. config/{env}.{yaml,toml,json} (if env specified)
/// 3. config/default.{yaml,toml,json}
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings with an explicit configuration directory
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    let default_path = dir.join("default");
    builder = builder.add_source(File::with_name(&default_path.to_string_lossy()).required(false));

    if let Some(env_name) = env {
        let env_path = dir.join(env_name);
        builder = builder.add_source(File::with_name(&env_path.to_string_lossy()).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("LISTEN")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    tracing::debug!(dir = %dir.display(), env = ?env, "Settings loaded");
    Ok(settings)
}
