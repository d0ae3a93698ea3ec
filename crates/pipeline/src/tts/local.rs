//! On-device synthesis
//!
//! `LocalVoiceBackend` adapts a device speech engine (a queue with global
//! pause/resume/cancel primitives) to the backend contract.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use listen_config::LocalEngineConfig;
use listen_core::{VoiceInfo, VoiceSelection};

use super::playhead::{Playhead, PlayheadEnd};
use super::{CompletionNotifier, InFlightUnit, SynthesisBackend, Utterance};
use crate::PipelineError;

/// Device speech synthesis queue
pub trait SpeechEngine: Send + Sync {
    /// Queue an utterance; its outcome is reported through `notifier`
    fn speak(&self, utterance: Utterance, notifier: CompletionNotifier) -> Result<(), PipelineError>;

    /// Suspend the engine
    fn pause(&self);

    /// Continue a suspended engine
    fn resume(&self);

    /// Drop the current utterance and everything queued behind it
    fn cancel(&self);

    /// Voices the engine offers
    fn voices(&self) -> Vec<VoiceInfo>;
}

/// Backend speaking through the device engine
pub struct LocalVoiceBackend {
    engine: Arc<dyn SpeechEngine>,
}

impl LocalVoiceBackend {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self { engine }
    }
}

impl SynthesisBackend for LocalVoiceBackend {
    fn dispatch(
        &self,
        mut utterance: Utterance,
        notifier: CompletionNotifier,
    ) -> Result<Box<dyn InFlightUnit>, PipelineError> {
        if let Some(VoiceSelection::Remote(id)) = &utterance.voice {
            return Err(PipelineError::InvalidVoice(format!(
                "{} is not an on-device voice",
                id
            )));
        }

        // Engines reject empty text; a lone space keeps the paragraph pause
        if utterance.text.is_empty() {
            utterance.text = " ".to_string();
        }

        tracing::debug!(
            index = utterance.index,
            ticket = notifier.ticket(),
            voice = ?utterance.voice,
            "Queueing unit on device engine"
        );

        self.engine.speak(utterance, notifier)?;

        Ok(Box::new(LocalUnit {
            engine: self.engine.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

struct LocalUnit {
    engine: Arc<dyn SpeechEngine>,
}

impl InFlightUnit for LocalUnit {
    fn pause(&mut self) {
        self.engine.pause();
    }

    fn resume(&mut self) {
        self.engine.resume();
    }

    fn stop(&mut self) {
        self.engine.cancel();
    }
}

/// Speech engine that paces utterances on the tokio clock instead of
/// producing sound. Lets the reader run headless.
#[derive(Clone)]
pub struct SimulatedSpeechEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    chars_per_second: f32,
    voices: Mutex<Vec<VoiceInfo>>,
    state: Mutex<EngineState>,
}

#[derive(Default)]
struct EngineState {
    queue: VecDeque<(Utterance, CompletionNotifier)>,
    current: Option<Speaking>,
    paused: bool,
    next_id: u64,
    /// Texts spoken to completion, oldest first
    spoken: Vec<String>,
}

struct Speaking {
    id: u64,
    playhead: Arc<Playhead>,
    task: JoinHandle<()>,
}

/// Slowest pace the simulated engine speaks at
const MIN_CHARS_PER_SECOND: f32 = 0.1;

impl SimulatedSpeechEngine {
    /// Paces below `MIN_CHARS_PER_SECOND`, and non-finite ones, are raised to it
    pub fn new(chars_per_second: f32, voices: Vec<VoiceInfo>) -> Self {
        let chars_per_second = if chars_per_second.is_finite() {
            chars_per_second.max(MIN_CHARS_PER_SECOND)
        } else {
            MIN_CHARS_PER_SECOND
        };
        Self {
            inner: Arc::new(EngineInner {
                chars_per_second,
                voices: Mutex::new(voices),
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    pub fn from_config(config: &LocalEngineConfig) -> Self {
        let voices = config
            .voices
            .iter()
            .map(|v| VoiceInfo::local(&v.id, &v.name, &v.lang))
            .collect();
        Self::new(config.chars_per_second, voices)
    }

    /// Texts spoken to completion so far
    pub fn spoken(&self) -> Vec<String> {
        self.inner.state.lock().spoken.clone()
    }

    /// Replace the installed voices, as when the device adds or removes one
    pub fn set_voices(&self, voices: Vec<VoiceInfo>) {
        *self.inner.voices.lock() = voices;
    }

    /// Whether the engine is suspended
    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// Whether an utterance is in progress
    pub fn is_speaking(&self) -> bool {
        self.inner.state.lock().current.is_some()
    }

    fn duration_for(&self, utterance: &Utterance) -> Duration {
        let chars = utterance.text.chars().count().max(1) as f32;
        let rate = if utterance.rate.is_finite() && utterance.rate > 0.0 {
            utterance.rate
        } else {
            1.0
        };
        let pace = (self.inner.chars_per_second * rate).max(MIN_CHARS_PER_SECOND);
        Duration::from_secs_f32(chars / pace)
    }

    fn start_next(&self, state: &mut EngineState) {
        if state.current.is_some() {
            return;
        }
        let Some((utterance, notifier)) = state.queue.pop_front() else {
            return;
        };

        if let Some(selection) = &utterance.voice {
            if !self.inner.voices.lock().iter().any(|v| v.id == selection.id()) {
                tracing::debug!(voice = %selection.id(), "Unknown voice, using engine default");
            }
        }

        let playhead = Arc::new(Playhead::new(self.duration_for(&utterance)));
        if !state.paused {
            playhead.play();
        }

        let id = state.next_id;
        state.next_id += 1;

        let engine = self.clone();
        let task_playhead = playhead.clone();
        let task = tokio::spawn(async move {
            if task_playhead.run().await == PlayheadEnd::Finished {
                engine.finish(id, utterance.text, notifier);
            }
        });

        state.current = Some(Speaking { id, playhead, task });
    }

    fn finish(&self, id: u64, text: String, notifier: CompletionNotifier) {
        let mut state = self.inner.state.lock();
        // A cancel may have replaced the utterance while the clock ran out
        if state.current.as_ref().map(|c| c.id) != Some(id) {
            return;
        }
        state.current = None;
        state.spoken.push(text);
        notifier.complete();
        self.start_next(&mut state);
    }
}

impl SpeechEngine for SimulatedSpeechEngine {
    fn speak(&self, utterance: Utterance, notifier: CompletionNotifier) -> Result<(), PipelineError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(PipelineError::Engine("no async runtime available".to_string()));
        }

        let mut state = self.inner.state.lock();
        state.queue.push_back((utterance, notifier));
        self.start_next(&mut state);
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.inner.state.lock();
        state.paused = true;
        if let Some(current) = &state.current {
            current.playhead.pause();
        }
    }

    fn resume(&self) {
        let mut state = self.inner.state.lock();
        state.paused = false;
        if let Some(current) = &state.current {
            current.playhead.play();
        }
    }

    fn cancel(&self) {
        let mut state = self.inner.state.lock();
        let dropped = state.queue.len();
        state.queue.clear();
        state.paused = false;
        if let Some(current) = state.current.take() {
            tracing::debug!(
                position_ms = current.playhead.position().as_millis() as u64,
                dropped,
                "Cancelling device speech"
            );
            current.playhead.cancel();
            current.task.abort();
        }
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        self.inner.voices.lock().clone()
    }
}
