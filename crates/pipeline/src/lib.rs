//! Reading pipeline: chunking, synthesis and playback sequencing
//!
//! This crate provides the core of the reader:
//! - Sentence and paragraph aware text chunking
//! - Synthesis backends for on-device and remote AI voices
//! - Voice catalog loading
//! - The playback sequencer state machine
//! - An async reader task driving the sequencer

pub mod reader;
pub mod sequencer;
pub mod tts;
pub mod voices;

// TTS exports
pub use tts::{
    chunk, AudioClip, AudioOutput, BackendNotification, CompletionNotifier, InFlightUnit,
    LocalVoiceBackend, PacedAudioOutput, RemoteBackendConfig, RemoteVoiceBackend,
    SimulatedSpeechEngine, SpeechEngine, SynthesisBackend, Ticket, Utterance,
};

// Sequencer exports
pub use sequencer::{Backends, Sequencer, SequencerConfig, SequencerEvent};

// Reader exports
pub use reader::{Reader, ReaderAction, ReaderHandle, ReaderStatus};

// Voice exports
pub use voices::{fetch_remote_voices, load_remote_voices, VoiceDirectory};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Synthesis engine error: {0}")]
    Engine(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Synthesis service returned HTTP {status}")]
    Http { status: u16 },

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Voice catalog error: {0}")]
    Catalog(String),

    #[error("Invalid voice: {0}")]
    InvalidVoice(String),

    #[error("Chunk size must be a positive integer")]
    InvalidChunkSize,

    #[error("Channel closed")]
    ChannelClosed,
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => PipelineError::Http {
                status: status.as_u16(),
            },
            None => PipelineError::Network(err.to_string()),
        }
    }
}
