//! Core types for the Listen reader
//!
//! This crate provides the types shared by every other crate:
//! - Playback state and progress arithmetic
//! - Voice selection and voice metadata
//! - The persisted reading session

pub mod playback;
pub mod session;
pub mod voice;

pub use playback::{progress_percent, PlaybackState};
pub use session::{PersistedSession, DEFAULT_CHUNK_SIZE, SESSION_KEY};
pub use voice::{VoiceInfo, VoiceKind, VoiceSelection, VoiceSettings};
