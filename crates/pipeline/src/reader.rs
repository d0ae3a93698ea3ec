//! Reader task
//!
//! Runs the sequencer on its own task. User commands and backend reports
//! are processed one at a time in a single loop, so the sequencer is never
//! shared.

use tokio::sync::{broadcast, mpsc, oneshot};

use listen_core::{PersistedSession, PlaybackState, VoiceSelection, VoiceSettings};

use crate::sequencer::{Sequencer, SequencerEvent};
use crate::tts::BackendNotification;
use crate::PipelineError;

/// User-level operations on the reader
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderAction {
    Play,
    Pause,
    Resume,
    Stop,
    /// Replace the document
    Load(String),
    Clear,
    SetChunkSize(usize),
    SetRate(f32),
    SetPitch(f32),
    SetVoice(Option<VoiceSelection>),
    Restore(PersistedSession),
}

/// Reader state after a command
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderStatus {
    pub state: PlaybackState,
    pub cursor: usize,
    pub total: usize,
    pub percent: u8,
    pub chunk_size: usize,
    pub voice: VoiceSettings,
}

impl ReaderStatus {
    fn of(sequencer: &Sequencer) -> Self {
        Self {
            state: sequencer.state(),
            cursor: sequencer.cursor(),
            total: sequencer.units().len(),
            percent: sequencer.progress(),
            chunk_size: sequencer.chunk_size(),
            voice: sequencer.voice().clone(),
        }
    }
}

enum ReaderCommand {
    Execute {
        action: ReaderAction,
        reply: oneshot::Sender<Result<ReaderStatus, PipelineError>>,
    },
    Status {
        reply: oneshot::Sender<ReaderStatus>,
    },
    Snapshot {
        reply: oneshot::Sender<PersistedSession>,
    },
    Shutdown {
        reply: oneshot::Sender<PersistedSession>,
    },
}

/// Owner of the sequencer
pub struct Reader {
    sequencer: Sequencer,
    notifications: mpsc::UnboundedReceiver<BackendNotification>,
    commands: mpsc::Receiver<ReaderCommand>,
}

impl Reader {
    /// Move the sequencer onto a new task and return a handle to it
    pub fn spawn(
        sequencer: Sequencer,
        notifications: mpsc::UnboundedReceiver<BackendNotification>,
    ) -> ReaderHandle {
        let (tx, commands) = mpsc::channel(32);
        let events = sequencer.event_sender();

        let reader = Reader {
            sequencer,
            notifications,
            commands,
        };
        tokio::spawn(reader.run());

        ReaderHandle { tx, events }
    }

    async fn run(mut self) {
        tracing::debug!("Reader started");

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(ReaderCommand::Execute { action, reply }) => {
                            let result = self.apply(action).map(|_| ReaderStatus::of(&self.sequencer));
                            let _ = reply.send(result);
                        }
                        Some(ReaderCommand::Status { reply }) => {
                            let _ = reply.send(ReaderStatus::of(&self.sequencer));
                        }
                        Some(ReaderCommand::Snapshot { reply }) => {
                            let _ = reply.send(self.sequencer.snapshot());
                        }
                        Some(ReaderCommand::Shutdown { reply }) => {
                            self.sequencer.stop();
                            let _ = reply.send(self.sequencer.snapshot());
                            break;
                        }
                        None => {
                            self.sequencer.stop();
                            break;
                        }
                    }
                }
                Some(notification) = self.notifications.recv() => {
                    if let Err(e) = self.sequencer.handle_notification(notification) {
                        tracing::warn!(error = %e, "Playback stopped");
                    }
                }
            }
        }

        tracing::debug!("Reader stopped");
    }

    fn apply(&mut self, action: ReaderAction) -> Result<(), PipelineError> {
        tracing::debug!(?action, state = %self.sequencer.state(), "Reader command");

        match action {
            ReaderAction::Play => self.sequencer.play(),
            ReaderAction::Pause => {
                self.sequencer.pause();
                Ok(())
            }
            ReaderAction::Resume => self.sequencer.resume(),
            ReaderAction::Stop => {
                self.sequencer.stop();
                Ok(())
            }
            ReaderAction::Load(text) => {
                self.sequencer.load_document(text);
                Ok(())
            }
            ReaderAction::Clear => {
                self.sequencer.clear();
                Ok(())
            }
            ReaderAction::SetChunkSize(size) => self.sequencer.set_chunk_size(size),
            ReaderAction::SetRate(rate) => {
                self.sequencer.set_rate(rate);
                Ok(())
            }
            ReaderAction::SetPitch(pitch) => {
                self.sequencer.set_pitch(pitch);
                Ok(())
            }
            ReaderAction::SetVoice(voice) => {
                self.sequencer.set_voice(voice);
                Ok(())
            }
            ReaderAction::Restore(session) => {
                self.sequencer.restore(session);
                Ok(())
            }
        }
    }
}

/// Cloneable handle to a running reader
#[derive(Clone)]
pub struct ReaderHandle {
    tx: mpsc::Sender<ReaderCommand>,
    events: broadcast::Sender<SequencerEvent>,
}

impl ReaderHandle {
    /// Run an action and return the resulting status
    pub async fn execute(&self, action: ReaderAction) -> Result<ReaderStatus, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.send(ReaderCommand::Execute { action, reply }).await?;
        rx.await.map_err(|_| PipelineError::ChannelClosed)?
    }

    pub async fn status(&self) -> Result<ReaderStatus, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.send(ReaderCommand::Status { reply }).await?;
        rx.await.map_err(|_| PipelineError::ChannelClosed)
    }

    /// Current session record
    pub async fn snapshot(&self) -> Result<PersistedSession, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.send(ReaderCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| PipelineError::ChannelClosed)
    }

    /// Stop playback, end the reader task and return the final session
    pub async fn shutdown(&self) -> Result<PersistedSession, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.send(ReaderCommand::Shutdown { reply }).await?;
        rx.await.map_err(|_| PipelineError::ChannelClosed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SequencerEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: ReaderCommand) -> Result<(), PipelineError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }
}
