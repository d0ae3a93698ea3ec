//! Playback sequencer
//!
//! Owns the unit sequence, the cursor and the playback state. Drives one
//! unit at a time through a synthesis backend and advances when the backend
//! reports completion.

use metrics::counter;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use listen_config::PlaybackConfig;
use listen_core::voice::{MAX_PITCH, MAX_RATE, MIN_PITCH, MIN_RATE};
use listen_core::{
    progress_percent, PersistedSession, PlaybackState, VoiceKind, VoiceSelection, VoiceSettings,
};

use crate::tts::{
    chunk, BackendNotification, CompletionNotifier, InFlightUnit, SynthesisBackend, Ticket,
    Utterance,
};
use crate::PipelineError;

/// Sequencer settings
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerConfig {
    /// Maximum characters per unit
    pub chunk_size: usize,
    /// Voice, rate and pitch for new units
    pub voice: VoiceSettings,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            chunk_size: listen_core::DEFAULT_CHUNK_SIZE,
            voice: VoiceSettings::default(),
        }
    }
}

impl From<&PlaybackConfig> for SequencerConfig {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            voice: VoiceSettings {
                voice: None,
                rate: config.rate,
                pitch: config.pitch,
            },
        }
    }
}

/// The two synthesis backends a reader can speak through
#[derive(Clone)]
pub struct Backends {
    pub local: Arc<dyn SynthesisBackend>,
    pub remote: Arc<dyn SynthesisBackend>,
}

impl Backends {
    pub fn new(local: Arc<dyn SynthesisBackend>, remote: Arc<dyn SynthesisBackend>) -> Self {
        Self { local, remote }
    }

    pub fn for_kind(&self, kind: VoiceKind) -> &Arc<dyn SynthesisBackend> {
        match kind {
            VoiceKind::Local => &self.local,
            VoiceKind::Remote => &self.remote,
        }
    }
}

/// Events published by the sequencer
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    /// Playback state changed
    StateChanged { old: PlaybackState, new: PlaybackState },
    /// A unit was handed to a backend
    UnitStarted { index: usize, text: String },
    /// Cursor moved
    Progress { cursor: usize, total: usize, percent: u8 },
    /// Playback stopped on an error
    Error(String),
}

struct InFlight {
    ticket: Ticket,
    handle: Box<dyn InFlightUnit>,
    /// Completion reported while paused, applied on resume
    completed: bool,
}

/// Playback state machine
pub struct Sequencer {
    backends: Backends,
    document: String,
    units: Vec<String>,
    cursor: usize,
    state: PlaybackState,
    chunk_size: usize,
    voice: VoiceSettings,
    in_flight: Option<InFlight>,
    next_ticket: Ticket,
    notify_tx: mpsc::UnboundedSender<BackendNotification>,
    event_tx: broadcast::Sender<SequencerEvent>,
}

impl Sequencer {
    /// Create a sequencer.
    ///
    /// Backend notifications arrive on the returned receiver and must be fed
    /// back through [`Sequencer::handle_notification`].
    pub fn new(
        backends: Backends,
        config: SequencerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<BackendNotification>) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(100);

        let sequencer = Self {
            backends,
            document: String::new(),
            units: Vec::new(),
            cursor: 0,
            state: PlaybackState::Idle,
            chunk_size: config.chunk_size.max(1),
            voice: config.voice,
            in_flight: None,
            next_ticket: 1,
            notify_tx,
            event_tx,
        };
        (sequencer, notify_rx)
    }

    /// Start reading, or continue from the cursor
    pub fn play(&mut self) -> Result<(), PipelineError> {
        match self.state {
            PlaybackState::Speaking => Ok(()),
            PlaybackState::Paused => self.resume(),
            PlaybackState::Idle | PlaybackState::Finished => {
                if self.document.trim().is_empty() {
                    tracing::debug!("Nothing to read");
                    return Ok(());
                }

                self.units = chunk(&self.document, self.chunk_size);
                if self.cursor >= self.units.len() {
                    self.cursor = 0;
                }
                self.emit_progress();

                tracing::info!(
                    units = self.units.len(),
                    cursor = self.cursor,
                    chunk_size = self.chunk_size,
                    "Starting playback"
                );
                self.set_state(PlaybackState::Speaking);
                self.dispatch_current()
            }
        }
    }

    /// Suspend the in-flight unit
    pub fn pause(&mut self) {
        if self.state != PlaybackState::Speaking {
            return;
        }
        if let Some(flight) = self.in_flight.as_mut() {
            flight.handle.pause();
        }
        self.set_state(PlaybackState::Paused);
    }

    /// Continue a paused unit; starts playback when nothing is in flight
    pub fn resume(&mut self) -> Result<(), PipelineError> {
        match self.state {
            PlaybackState::Speaking => Ok(()),
            PlaybackState::Idle | PlaybackState::Finished => self.play(),
            PlaybackState::Paused => {
                self.set_state(PlaybackState::Speaking);

                let Some(flight) = self.in_flight.as_mut() else {
                    return self.dispatch_current();
                };
                flight.handle.resume();

                if flight.completed {
                    self.in_flight = None;
                    self.advance()
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Abort the in-flight unit and go idle. The cursor is kept.
    pub fn stop(&mut self) {
        if let Some(mut flight) = self.in_flight.take() {
            tracing::debug!(ticket = flight.ticket, cursor = self.cursor, "Stopping in-flight unit");
            flight.handle.stop();
        }
        self.set_state(PlaybackState::Idle);
    }

    /// Apply a backend report.
    ///
    /// Reports for anything but the in-flight unit are ignored. A failure of
    /// the in-flight unit stops playback and is returned.
    pub fn handle_notification(
        &mut self,
        notification: BackendNotification,
    ) -> Result<(), PipelineError> {
        let ticket = notification.ticket();
        let current = self.in_flight.as_ref().map(|f| f.ticket);
        if current != Some(ticket) {
            tracing::debug!(ticket, ?current, "Ignoring stale backend report");
            return Ok(());
        }

        match notification {
            BackendNotification::Completed { .. } => match self.state {
                PlaybackState::Speaking => {
                    self.in_flight = None;
                    counter!("listen_units_completed_total").increment(1);
                    self.advance()
                }
                PlaybackState::Paused => {
                    if let Some(flight) = self.in_flight.as_mut() {
                        flight.completed = true;
                    }
                    counter!("listen_units_completed_total").increment(1);
                    Ok(())
                }
                PlaybackState::Idle | PlaybackState::Finished => Ok(()),
            },
            BackendNotification::Failed { error, .. } => {
                if let Some(mut flight) = self.in_flight.take() {
                    flight.handle.stop();
                }
                counter!("listen_units_failed_total").increment(1);
                tracing::warn!(cursor = self.cursor, error = %error, "Unit failed, stopping playback");
                self.fail(error)
            }
        }
    }

    /// Replace the document and start over from the first unit
    pub fn load_document(&mut self, text: impl Into<String>) {
        self.stop();
        self.document = text.into();
        self.units = chunk(&self.document, self.chunk_size);
        self.cursor = 0;
        tracing::info!(chars = self.document.chars().count(), units = self.units.len(), "Document loaded");
        self.emit_progress();
    }

    /// Stop playback and forget the document
    pub fn clear(&mut self) {
        self.stop();
        self.document.clear();
        self.units.clear();
        self.cursor = 0;
        self.emit_progress();
    }

    /// Change the chunk size used from the next `play()` on
    pub fn set_chunk_size(&mut self, chunk_size: usize) -> Result<(), PipelineError> {
        if chunk_size == 0 {
            return Err(PipelineError::InvalidChunkSize);
        }
        self.chunk_size = chunk_size;
        Ok(())
    }

    /// Select the voice for the next unit
    pub fn set_voice(&mut self, voice: Option<VoiceSelection>) {
        self.voice.voice = voice;
    }

    /// Set the speaking rate for the next unit, clamped to the backend range
    pub fn set_rate(&mut self, rate: f32) {
        if rate.is_finite() {
            self.voice.rate = rate.clamp(MIN_RATE, MAX_RATE);
        }
    }

    /// Set the pitch for the next unit, clamped to the backend range
    pub fn set_pitch(&mut self, pitch: f32) {
        if pitch.is_finite() {
            self.voice.pitch = pitch.clamp(MIN_PITCH, MAX_PITCH);
        }
    }

    /// Restore a persisted session. Playback stays idle.
    pub fn restore(&mut self, session: PersistedSession) {
        self.stop();
        let session = session.normalized();

        self.document = session.text;
        self.chunk_size = session.chunk_size;
        self.set_rate(session.rate);
        self.set_pitch(session.pitch);
        if session.voice.is_some() {
            self.voice.voice = session.voice;
        }
        self.units = chunk(&self.document, self.chunk_size);
        self.cursor = session.cursor.min(self.units.len());

        tracing::info!(
            cursor = self.cursor,
            units = self.units.len(),
            "Session restored"
        );
        self.emit_progress();
    }

    /// Session record for the progress store
    pub fn snapshot(&self) -> PersistedSession {
        PersistedSession {
            text: self.document.clone(),
            cursor: self.cursor,
            rate: self.voice.rate,
            pitch: self.voice.pitch,
            chunk_size: self.chunk_size,
            voice: self.voice.voice.clone(),
            saved_at: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn voice(&self) -> &VoiceSettings {
        &self.voice
    }

    /// Completion percentage of the current sequence
    pub fn progress(&self) -> u8 {
        progress_percent(self.cursor, self.units.len())
    }

    /// Ticket of the in-flight unit
    pub fn in_flight_ticket(&self) -> Option<Ticket> {
        self.in_flight.as_ref().map(|f| f.ticket)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SequencerEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SequencerEvent> {
        self.event_tx.clone()
    }

    fn advance(&mut self) -> Result<(), PipelineError> {
        self.cursor += 1;
        self.emit_progress();

        if self.cursor >= self.units.len() {
            tracing::info!(units = self.units.len(), "Finished reading");
            self.set_state(PlaybackState::Finished);
            Ok(())
        } else {
            self.dispatch_current()
        }
    }

    fn dispatch_current(&mut self) -> Result<(), PipelineError> {
        let Some(text) = self.units.get(self.cursor).cloned() else {
            self.set_state(PlaybackState::Finished);
            return Ok(());
        };

        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let utterance = Utterance {
            index: self.cursor,
            text: text.clone(),
            voice: self.voice.voice.clone(),
            rate: self.voice.rate,
            pitch: self.voice.pitch,
        };
        let backend = self.backends.for_kind(self.voice.kind());
        let backend_name = backend.name();
        let notifier = CompletionNotifier::new(ticket, self.notify_tx.clone());

        match backend.dispatch(utterance, notifier) {
            Ok(handle) => {
                self.in_flight = Some(InFlight {
                    ticket,
                    handle,
                    completed: false,
                });
                counter!("listen_units_dispatched_total", "backend" => backend_name).increment(1);
                tracing::debug!(index = self.cursor, ticket, backend = backend_name, "Unit dispatched");
                let _ = self.event_tx.send(SequencerEvent::UnitStarted {
                    index: self.cursor,
                    text,
                });
                Ok(())
            }
            Err(e) => {
                counter!("listen_units_failed_total").increment(1);
                tracing::warn!(index = self.cursor, backend = backend_name, error = %e, "Dispatch failed");
                self.fail(e)
            }
        }
    }

    fn fail(&mut self, error: PipelineError) -> Result<(), PipelineError> {
        self.set_state(PlaybackState::Idle);
        let _ = self.event_tx.send(SequencerEvent::Error(error.to_string()));
        Err(error)
    }

    fn set_state(&mut self, new: PlaybackState) {
        let old = self.state;
        self.state = new;
        if old != new {
            tracing::debug!(%old, %new, "Playback state changed");
            let _ = self.event_tx.send(SequencerEvent::StateChanged { old, new });
        }
    }

    fn emit_progress(&self) {
        let _ = self.event_tx.send(SequencerEvent::Progress {
            cursor: self.cursor,
            total: self.units.len(),
            percent: self.progress(),
        });
    }
}
