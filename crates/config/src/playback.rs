//! Playback and synthesis backend configuration

use serde::{Deserialize, Serialize};

use listen_core::DEFAULT_CHUNK_SIZE;

/// Playback defaults applied when no session is restored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Speaking rate (1.0 = normal)
    #[serde(default = "default_one")]
    pub rate: f32,

    /// Pitch (1.0 = normal)
    #[serde(default = "default_one")]
    pub pitch: f32,

    /// Maximum characters per spoken unit
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Preferred voice id; falls back to the first English local voice
    #[serde(default)]
    pub voice: Option<String>,
}

fn default_one() -> f32 {
    1.0
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            rate: default_one(),
            pitch: default_one(),
            chunk_size: default_chunk_size(),
            voice: None,
        }
    }
}

/// Voice exposed by the simulated on-device engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalVoiceEntry {
    pub id: String,
    pub name: String,
    pub lang: String,
}

/// On-device engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalEngineConfig {
    /// Speaking pace at rate 1.0
    #[serde(default = "default_chars_per_second")]
    pub chars_per_second: f32,

    /// Voices the engine reports
    #[serde(default = "default_local_voices")]
    pub voices: Vec<LocalVoiceEntry>,
}

fn default_chars_per_second() -> f32 {
    15.0
}

fn default_local_voices() -> Vec<LocalVoiceEntry> {
    vec![
        LocalVoiceEntry {
            id: "local:en-US:ava".to_string(),
            name: "Ava".to_string(),
            lang: "en-US".to_string(),
        },
        LocalVoiceEntry {
            id: "local:de-DE:anna".to_string(),
            name: "Anna".to_string(),
            lang: "de-DE".to_string(),
        },
    ]
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            chars_per_second: default_chars_per_second(),
            voices: default_local_voices(),
        }
    }
}

/// Remote AI voice configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteVoiceConfig {
    /// Offer remote voices at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Synthesis endpoint receiving `{"text", "voice"}`
    #[serde(default = "default_synthesis_url")]
    pub synthesis_url: String,

    /// Voice catalog location (URL or file path)
    #[serde(default = "default_catalog")]
    pub catalog: String,

    /// Silence played for empty pause markers (ms)
    #[serde(default = "default_pause_marker_ms")]
    pub pause_marker_ms: u64,

    /// Optional request timeout; unset means wait indefinitely
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    /// Assumed bitrate for payloads whose duration cannot be read
    #[serde(default = "default_fallback_bytes_per_second")]
    pub fallback_bytes_per_second: u32,
}

fn default_true() -> bool {
    true
}

fn default_synthesis_url() -> String {
    "https://api.example.com/tts".to_string()
}

fn default_catalog() -> String {
    "ai-voices.json".to_string()
}

fn default_pause_marker_ms() -> u64 {
    400
}

fn default_fallback_bytes_per_second() -> u32 {
    16_000 // 128 kbit/s compressed audio
}

impl Default for RemoteVoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            synthesis_url: default_synthesis_url(),
            catalog: default_catalog(),
            pause_marker_ms: default_pause_marker_ms(),
            request_timeout_ms: None,
            fallback_bytes_per_second: default_fallback_bytes_per_second(),
        }
    }
}
