//! Text-to-Speech backends
//!
//! Features:
//! - Paragraph and sentence aware chunking into speakable units
//! - One backend contract for on-device and remote AI voices
//! - Ticketed completion notifications so late reports can be discarded

mod chunker;
mod local;
mod playhead;
mod remote;

pub use chunker::{chunk, BACKTRACK_RATIO};
pub use local::{LocalVoiceBackend, SimulatedSpeechEngine, SpeechEngine};
pub use remote::{AudioClip, AudioOutput, PacedAudioOutput, RemoteBackendConfig, RemoteVoiceBackend};

use listen_core::VoiceSelection;
use tokio::sync::mpsc;

use crate::PipelineError;

/// Identifier of one dispatch
pub type Ticket = u64;

/// One unit handed to a backend
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// Position of the unit in the sequence
    pub index: usize,
    /// Text to speak; empty for a pause marker
    pub text: String,
    /// Selected voice, `None` for the engine default
    pub voice: Option<VoiceSelection>,
    /// Speaking rate (1.0 = normal)
    pub rate: f32,
    /// Pitch (1.0 = normal)
    pub pitch: f32,
}

impl Utterance {
    /// Empty units mark a pause between paragraphs
    pub fn is_pause_marker(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Outcome of a dispatched unit, reported by its backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendNotification {
    /// The unit finished naturally
    Completed { ticket: Ticket },
    /// The unit could not be spoken
    Failed { ticket: Ticket, error: PipelineError },
}

impl BackendNotification {
    pub fn ticket(&self) -> Ticket {
        match self {
            BackendNotification::Completed { ticket }
            | BackendNotification::Failed { ticket, .. } => *ticket,
        }
    }
}

/// Reports the outcome of exactly one dispatched unit.
///
/// Both reporting methods consume the notifier, so a unit reports at most
/// once. A notifier dropped without reporting (a stopped unit) sends nothing.
#[derive(Debug)]
pub struct CompletionNotifier {
    ticket: Ticket,
    tx: mpsc::UnboundedSender<BackendNotification>,
}

impl CompletionNotifier {
    pub fn new(ticket: Ticket, tx: mpsc::UnboundedSender<BackendNotification>) -> Self {
        Self { ticket, tx }
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Report natural completion
    pub fn complete(self) {
        let _ = self.tx.send(BackendNotification::Completed { ticket: self.ticket });
    }

    /// Report a failure
    pub fn fail(self, error: PipelineError) {
        let _ = self.tx.send(BackendNotification::Failed {
            ticket: self.ticket,
            error,
        });
    }
}

/// Control handle of the unit currently being spoken
pub trait InFlightUnit: Send {
    /// Suspend playback of the unit
    fn pause(&mut self);

    /// Continue a suspended unit
    fn resume(&mut self);

    /// Abort the unit and reset its playback position. No notification
    /// may be reported for the unit afterwards.
    fn stop(&mut self);
}

/// Synthesis backend trait
pub trait SynthesisBackend: Send + Sync {
    /// Start speaking one unit.
    ///
    /// The outcome is reported through `notifier`; an `Err` here means the
    /// unit never started and nothing will be reported.
    fn dispatch(
        &self,
        utterance: Utterance,
        notifier: CompletionNotifier,
    ) -> Result<Box<dyn InFlightUnit>, PipelineError>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}
