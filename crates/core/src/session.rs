//! Persisted reading session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::voice::VoiceSelection;

/// Fixed storage key of the session record
pub const SESSION_KEY: &str = "listen_state";

/// Chunk size used when none was stored
pub const DEFAULT_CHUNK_SIZE: usize = 220;

/// Snapshot of the document, position and voice parameters.
///
/// Field names on disk follow the legacy `listen_state` record (`index`,
/// `chunkSize`). Every field is optional on read so older or partial records
/// still restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    #[serde(default)]
    pub text: String,

    /// Playback cursor
    #[serde(rename = "index", default)]
    pub cursor: usize,

    #[serde(default = "default_rate")]
    pub rate: f32,

    #[serde(default = "default_pitch")]
    pub pitch: f32,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Last selected voice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceSelection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

fn default_rate() -> f32 {
    1.0
}

fn default_pitch() -> f32 {
    1.0
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl PersistedSession {
    /// Stamp the record with the current time
    pub fn stamped(mut self) -> Self {
        self.saved_at = Some(Utc::now());
        self
    }

    /// Replace values a restore cannot use with their defaults.
    ///
    /// A zero chunk size would violate the chunker contract and a zero or
    /// non-finite rate cannot be spoken.
    pub fn normalized(mut self) -> Self {
        if self.chunk_size == 0 {
            self.chunk_size = DEFAULT_CHUNK_SIZE;
        }
        if !self.rate.is_finite() || self.rate <= 0.0 {
            self.rate = default_rate();
        }
        if !self.pitch.is_finite() || self.pitch < 0.0 {
            self.pitch = default_pitch();
        }
        self
    }
}

impl Default for PersistedSession {
    fn default() -> Self {
        Self {
            text: String::new(),
            cursor: 0,
            rate: default_rate(),
            pitch: default_pitch(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            voice: None,
            saved_at: None,
        }
    }
}
