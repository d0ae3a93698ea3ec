//! Remote AI voices
//!
//! Fetches synthesized audio for one unit from an HTTP service and plays it
//! through an `AudioOutput`. Fetch and playback failures are reported the
//! same way as engine errors.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use listen_config::RemoteVoiceConfig;
use listen_core::VoiceSelection;

use super::playhead::{Playhead, PlayheadEnd};
use super::{CompletionNotifier, InFlightUnit, SynthesisBackend, Utterance};
use crate::PipelineError;

/// A playable audio clip
#[async_trait]
pub trait AudioClip: Send + Sync {
    /// Start or continue playback
    fn play(&self);

    /// Suspend playback
    fn pause(&self);

    /// Reset the playback position to the start
    fn rewind(&self);

    /// Resolves when playback reaches the end
    async fn ended(&self) -> Result<(), PipelineError>;
}

/// Turns an audio payload into a playable clip
pub trait AudioOutput: Send + Sync {
    fn load(&self, payload: Vec<u8>) -> Result<Arc<dyn AudioClip>, PipelineError>;
}

/// Audio output that plays clips on the tokio clock.
///
/// WAV payloads take their length from the header; other formats are
/// estimated from their size.
pub struct PacedAudioOutput {
    fallback_bytes_per_second: u32,
}

impl PacedAudioOutput {
    pub fn new(fallback_bytes_per_second: u32) -> Self {
        Self {
            fallback_bytes_per_second: fallback_bytes_per_second.max(1),
        }
    }

    /// Playback length of a payload
    pub fn duration_of(&self, payload: &[u8]) -> Duration {
        match hound::WavReader::new(Cursor::new(payload)) {
            Ok(reader) => {
                let spec = reader.spec();
                Duration::from_secs_f64(reader.duration() as f64 / spec.sample_rate.max(1) as f64)
            }
            Err(_) => Duration::from_secs_f64(
                payload.len() as f64 / self.fallback_bytes_per_second as f64,
            ),
        }
    }
}

impl AudioOutput for PacedAudioOutput {
    fn load(&self, payload: Vec<u8>) -> Result<Arc<dyn AudioClip>, PipelineError> {
        if payload.is_empty() {
            return Err(PipelineError::Playback("empty audio payload".to_string()));
        }
        let duration = self.duration_of(&payload);
        tracing::debug!(bytes = payload.len(), duration_ms = duration.as_millis() as u64, "Audio clip loaded");
        Ok(Arc::new(PacedClip::new(duration)))
    }
}

/// Clip of a fixed length played on the tokio clock
pub struct PacedClip {
    playhead: Playhead,
}

impl PacedClip {
    pub fn new(duration: Duration) -> Self {
        Self {
            playhead: Playhead::new(duration),
        }
    }
}

#[async_trait]
impl AudioClip for PacedClip {
    fn play(&self) {
        self.playhead.play();
    }

    fn pause(&self) {
        self.playhead.pause();
    }

    fn rewind(&self) {
        self.playhead.rewind();
    }

    async fn ended(&self) -> Result<(), PipelineError> {
        match self.playhead.run().await {
            PlayheadEnd::Finished => Ok(()),
            PlayheadEnd::Cancelled => Err(PipelineError::Playback("clip cancelled".to_string())),
        }
    }
}

impl Drop for PacedClip {
    fn drop(&mut self) {
        self.playhead.cancel();
    }
}

/// Remote backend settings
#[derive(Debug, Clone)]
pub struct RemoteBackendConfig {
    /// Synthesis endpoint
    pub synthesis_url: String,
    /// Silence played for empty pause markers
    pub pause_marker: Duration,
    /// Optional request timeout
    pub request_timeout: Option<Duration>,
}

impl From<&RemoteVoiceConfig> for RemoteBackendConfig {
    fn from(config: &RemoteVoiceConfig) -> Self {
        Self {
            synthesis_url: config.synthesis_url.clone(),
            pause_marker: Duration::from_millis(config.pause_marker_ms),
            request_timeout: config.request_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

/// Backend speaking through a remote synthesis service
pub struct RemoteVoiceBackend {
    client: reqwest::Client,
    config: RemoteBackendConfig,
    output: Arc<dyn AudioOutput>,
}

impl RemoteVoiceBackend {
    pub fn new(config: RemoteBackendConfig, output: Arc<dyn AudioOutput>) -> Result<Self, PipelineError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::Network(e.to_string()))?;

        Ok(Self {
            client,
            config,
            output,
        })
    }
}

impl SynthesisBackend for RemoteVoiceBackend {
    fn dispatch(
        &self,
        utterance: Utterance,
        notifier: CompletionNotifier,
    ) -> Result<Box<dyn InFlightUnit>, PipelineError> {
        let voice = match &utterance.voice {
            Some(VoiceSelection::Remote(id)) => id.clone(),
            other => {
                return Err(PipelineError::InvalidVoice(format!(
                    "remote backend needs a remote voice, got {:?}",
                    other
                )))
            }
        };

        let slot = Arc::new(Mutex::new(ClipSlot::default()));
        let job = RemoteJob {
            client: self.client.clone(),
            url: self.config.synthesis_url.clone(),
            pause_marker: self.config.pause_marker,
            output: self.output.clone(),
            slot: slot.clone(),
        };
        let index = utterance.index;
        let ticket = notifier.ticket();

        let task = tokio::spawn(async move {
            match job.run(&utterance, &voice).await {
                Ok(()) => notifier.complete(),
                Err(e) => {
                    tracing::warn!(index, ticket, error = %e, "Remote voice unit failed");
                    notifier.fail(e);
                }
            }
        });

        Ok(Box::new(RemoteUnit { slot, task }))
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[derive(Default)]
struct ClipSlot {
    clip: Option<Arc<dyn AudioClip>>,
    paused: bool,
}

struct RemoteJob {
    client: reqwest::Client,
    url: String,
    pause_marker: Duration,
    output: Arc<dyn AudioOutput>,
    slot: Arc<Mutex<ClipSlot>>,
}

impl RemoteJob {
    async fn run(self, utterance: &Utterance, voice: &str) -> Result<(), PipelineError> {
        let clip: Arc<dyn AudioClip> = if utterance.is_pause_marker() {
            Arc::new(PacedClip::new(self.pause_marker))
        } else {
            let payload = self.fetch(&utterance.text, voice).await?;
            self.output.load(payload)?
        };

        {
            let mut slot = self.slot.lock();
            if !slot.paused {
                clip.play();
            }
            slot.clip = Some(clip.clone());
        }

        clip.ended().await
    }

    async fn fetch(&self, text: &str, voice: &str) -> Result<Vec<u8>, PipelineError> {
        tracing::debug!(url = %self.url, voice, chars = text.chars().count(), "Requesting remote synthesis");

        let response = self
            .client
            .post(&self.url)
            .json(&SynthesisRequest { text, voice })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Http {
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

struct RemoteUnit {
    slot: Arc<Mutex<ClipSlot>>,
    task: JoinHandle<()>,
}

impl InFlightUnit for RemoteUnit {
    fn pause(&mut self) {
        let mut slot = self.slot.lock();
        slot.paused = true;
        if let Some(clip) = &slot.clip {
            clip.pause();
        }
    }

    fn resume(&mut self) {
        let mut slot = self.slot.lock();
        slot.paused = false;
        if let Some(clip) = &slot.clip {
            clip.play();
        }
    }

    fn stop(&mut self) {
        self.task.abort();
        let mut slot = self.slot.lock();
        if let Some(clip) = slot.clip.take() {
            clip.pause();
            clip.rewind();
        }
    }
}

impl Drop for RemoteUnit {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::BackendNotification;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use tokio::sync::{mpsc, Notify};

    type Seen = Arc<Mutex<Vec<Value>>>;

    async fn synthesize(State(seen): State<Seen>, Json(body): Json<Value>) -> (StatusCode, Vec<u8>) {
        let failing = body["voice"] == "broken";
        seen.lock().push(body);
        if failing {
            (StatusCode::SERVICE_UNAVAILABLE, Vec::new())
        } else {
            // 1.6 s at the test bitrate
            (StatusCode::OK, vec![7u8; 1600])
        }
    }

    async fn serve() -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/tts", post(synthesize))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/tts", addr), seen)
    }

    fn backend(url: String) -> RemoteVoiceBackend {
        let config = RemoteBackendConfig {
            synthesis_url: url,
            pause_marker: Duration::from_millis(50),
            request_timeout: None,
        };
        RemoteVoiceBackend::new(config, Arc::new(PacedAudioOutput::new(1000))).unwrap()
    }

    fn utterance(text: &str, voice: &str) -> Utterance {
        Utterance {
            index: 0,
            text: text.to_string(),
            voice: Some(VoiceSelection::Remote(voice.to_string())),
            rate: 1.0,
            pitch: 1.0,
        }
    }

    #[tokio::test]
    async fn test_fetches_and_plays() {
        let (url, seen) = serve().await;
        let backend = backend(url);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _unit = backend
            .dispatch(utterance("Hello there.", "nova"), CompletionNotifier::new(5, tx))
            .unwrap();

        let notification = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap();
        assert_eq!(notification, Some(BackendNotification::Completed { ticket: 5 }));

        let requests = seen.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["text"], "Hello there.");
        assert_eq!(requests[0]["voice"], "nova");
    }

    #[tokio::test]
    async fn test_http_failure_is_reported() {
        let (url, _seen) = serve().await;
        let backend = backend(url);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _unit = backend
            .dispatch(utterance("Hello.", "broken"), CompletionNotifier::new(9, tx))
            .unwrap();

        let notification = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap();
        assert_eq!(
            notification,
            Some(BackendNotification::Failed {
                ticket: 9,
                error: PipelineError::Http { status: 503 },
            })
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = backend(format!("http://{}/tts", addr));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _unit = backend
            .dispatch(utterance("Hello.", "nova"), CompletionNotifier::new(1, tx))
            .unwrap();

        let notification = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap();
        assert!(matches!(
            notification,
            Some(BackendNotification::Failed { error: PipelineError::Network(_), .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_discards_report() {
        let (url, _seen) = serve().await;
        let backend = backend(url);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut unit = backend
            .dispatch(utterance("Stop me.", "nova"), CompletionNotifier::new(2, tx))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        unit.stop();

        // The clip would have ended after 1.6 s
        let late = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;
        assert!(matches!(late, Ok(None)) || late.is_err());
    }

    /// Service that holds each response until the gate opens
    async fn serve_gated() -> (String, mpsc::UnboundedReceiver<()>, Arc<Notify>) {
        let (arrived_tx, arrived_rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Notify::new());
        let handler_gate = gate.clone();
        let app = Router::new().route(
            "/tts",
            post(move || {
                let arrived = arrived_tx.clone();
                let gate = handler_gate.clone();
                async move {
                    let _ = arrived.send(());
                    gate.notified().await;
                    // 0.3 s at the test bitrate
                    vec![7u8; 300]
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/tts", addr), arrived_rx, gate)
    }

    #[tokio::test]
    async fn test_pause_before_audio_arrives_holds_playback() {
        let (url, mut arrived, gate) = serve_gated().await;
        let backend = backend(url);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut unit = backend
            .dispatch(utterance("Wait for it.", "nova"), CompletionNotifier::new(6, tx))
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), arrived.recv())
            .await
            .unwrap();

        unit.pause();
        gate.notify_one();

        // Well past the clip length; the loaded clip must stay unstarted
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());

        unit.resume();
        let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(notification, Some(BackendNotification::Completed { ticket: 6 }));
    }

    #[tokio::test]
    async fn test_pause_and_resume_mid_clip() {
        let (url, _seen) = serve().await;
        let backend = backend(url);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut unit = backend
            .dispatch(utterance("Hold on.", "nova"), CompletionNotifier::new(8, tx))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        unit.pause();

        // The clip would have ended after 1.6 s
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err());

        unit.resume();
        let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(notification, Some(BackendNotification::Completed { ticket: 8 }));
    }

    #[tokio::test]
    async fn test_pause_marker_skips_the_service() {
        let (url, seen) = serve().await;
        let backend = backend(url);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _unit = backend
            .dispatch(utterance("", "nova"), CompletionNotifier::new(3, tx))
            .unwrap();

        let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(notification, Some(BackendNotification::Completed { ticket: 3 }));
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_local_voice() {
        let backend = backend("http://127.0.0.1:9/tts".to_string());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut local = utterance("Hi.", "nova");
        local.voice = Some(VoiceSelection::Local("ava".to_string()));

        let result = backend.dispatch(local, CompletionNotifier::new(1, tx));
        assert!(matches!(result, Err(PipelineError::InvalidVoice(_))));
    }

    #[test]
    fn test_wav_duration_from_header() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut buffer, spec).unwrap();
            for _ in 0..4000 {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let output = PacedAudioOutput::new(1000);
        assert_eq!(output.duration_of(buffer.get_ref()), Duration::from_millis(500));
        assert_eq!(output.duration_of(&[0u8; 250]), Duration::from_millis(250));
    }

    #[test]
    fn test_empty_payload_is_rejected() {
        let output = PacedAudioOutput::new(1000);
        assert!(matches!(output.load(Vec::new()), Err(PipelineError::Playback(_))));
    }
}
