//! Wiring of the reader and the command handlers

use anyhow::Context;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

use listen_config::Settings;
use listen_core::{PersistedSession, PlaybackState, VoiceKind, VoiceSelection};
use listen_persistence::{FileProgressStore, ProgressStore};
use listen_pipeline::{
    load_remote_voices, Backends, LocalVoiceBackend, PacedAudioOutput, Reader, ReaderAction,
    ReaderHandle, ReaderStatus, RemoteBackendConfig, RemoteVoiceBackend, Sequencer,
    SequencerConfig, SimulatedSpeechEngine, SpeechEngine, SynthesisBackend, VoiceDirectory,
};

use crate::command::{Command, HELP};

/// What the shell should do after a command
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Print the message and read the next line
    Continue(String),
    Quit,
}

/// Where the voice list comes from
pub struct VoiceSources {
    pub engine: Arc<dyn SpeechEngine>,
    /// Remote catalog location, `None` when AI voices are disabled
    pub catalog: Option<String>,
}

impl VoiceSources {
    /// Enumerate the engine's voices and load the remote catalog
    pub async fn load(&self) -> VoiceDirectory {
        let remote = match &self.catalog {
            Some(location) => load_remote_voices(location).await,
            None => Vec::new(),
        };
        VoiceDirectory::new(self.engine.voices(), remote)
    }
}

/// A running reader with its store and voice list
pub struct App {
    reader: ReaderHandle,
    store: Arc<dyn ProgressStore>,
    sources: VoiceSources,
    voices: RwLock<VoiceDirectory>,
}

impl App {
    /// Build the backends from settings, restore the saved session and start
    /// the reader
    pub async fn start(settings: &Settings) -> anyhow::Result<Self> {
        let engine: Arc<dyn SpeechEngine> =
            Arc::new(SimulatedSpeechEngine::from_config(&settings.local));
        let sources = VoiceSources {
            engine: engine.clone(),
            catalog: settings
                .remote
                .enabled
                .then(|| settings.remote.catalog.clone()),
        };
        let voices = sources.load().await;

        let local: Arc<dyn SynthesisBackend> = Arc::new(LocalVoiceBackend::new(engine));
        let remote: Arc<dyn SynthesisBackend> = Arc::new(
            RemoteVoiceBackend::new(
                RemoteBackendConfig::from(&settings.remote),
                Arc::new(PacedAudioOutput::new(settings.remote.fallback_bytes_per_second)),
            )
            .context("Failed to create remote voice client")?,
        );

        let store: Arc<dyn ProgressStore> = Arc::new(
            FileProgressStore::new(&settings.storage.dir, &settings.storage.session_key)
                .context("Invalid storage settings")?,
        );

        let mut config = SequencerConfig::from(&settings.playback);
        config.voice.voice = initial_voice(&voices, settings.playback.voice.as_deref());

        Self::with_parts(Backends::new(local, remote), config, store, sources, voices).await
    }

    /// Start a reader over the given backends and restore the stored session
    pub async fn with_parts(
        backends: Backends,
        config: SequencerConfig,
        store: Arc<dyn ProgressStore>,
        sources: VoiceSources,
        voices: VoiceDirectory,
    ) -> anyhow::Result<Self> {
        let (sequencer, notifications) = Sequencer::new(backends, config);
        let reader = Reader::spawn(sequencer, notifications);

        let app = Self {
            reader,
            store,
            sources,
            voices: RwLock::new(voices),
        };
        app.restore().await?;
        Ok(app)
    }

    pub fn reader(&self) -> &ReaderHandle {
        &self.reader
    }

    async fn restore(&self) -> anyhow::Result<()> {
        let Some(session) = self.store.load().await else {
            tracing::info!("No saved session");
            return Ok(());
        };

        let stale_voice = session
            .voice
            .as_ref()
            .is_some_and(|voice| !self.voices.read().contains(voice));

        let status = self.reader.execute(ReaderAction::Restore(session)).await?;
        if stale_voice {
            tracing::warn!("Saved voice is no longer available, using the default");
            self.fall_back_voice().await?;
        }

        tracing::info!(cursor = status.cursor, total = status.total, "Restored saved session");
        Ok(())
    }

    async fn fall_back_voice(&self) -> anyhow::Result<()> {
        let fallback = self.voices.read().preferred().map(|v| v.selection());
        self.reader.execute(ReaderAction::SetVoice(fallback)).await?;
        Ok(())
    }

    /// Re-enumerate the engine's voices and reload the remote catalog.
    /// A selected voice that disappeared is replaced by the preferred one.
    pub async fn refresh_voices(&self) -> anyhow::Result<String> {
        let remote = match &self.sources.catalog {
            Some(location) => Some(load_remote_voices(location).await),
            None => None,
        };

        let (local_count, remote_count) = {
            let mut voices = self.voices.write();
            voices.refresh_local(self.sources.engine.as_ref());
            if let Some(remote) = remote {
                voices.set_remote(remote);
            }
            (voices.local().len(), voices.remote().len())
        };
        tracing::info!(local = local_count, remote = remote_count, "Voice list refreshed");

        let status = self.reader.status().await?;
        let selected_gone = status
            .voice
            .voice
            .as_ref()
            .is_some_and(|voice| !self.voices.read().contains(voice));
        if selected_gone {
            tracing::warn!("Selected voice is no longer available, using the default");
            self.fall_back_voice().await?;
        }

        Ok(format!(
            "{} device voices, {} AI voices",
            local_count, remote_count
        ))
    }

    /// Persist the current session
    pub async fn save(&self) -> anyhow::Result<PersistedSession> {
        let session = self.reader.snapshot().await?;
        self.store.save(&session).await.context("Failed to save progress")?;
        Ok(session)
    }

    /// Stop the reader and persist its final session
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let session = self.reader.shutdown().await?;
        self.store.save(&session).await.context("Failed to save progress")?;
        tracing::info!(cursor = session.cursor, "Progress saved on exit");
        Ok(())
    }

    /// Run one command
    pub async fn handle(&self, command: Command) -> anyhow::Result<Flow> {
        let message = match command {
            Command::Play => describe(&self.reader.execute(ReaderAction::Play).await?),
            Command::Pause => describe(&self.reader.execute(ReaderAction::Pause).await?),
            Command::Resume => describe(&self.reader.execute(ReaderAction::Resume).await?),
            Command::Stop => describe(&self.reader.execute(ReaderAction::Stop).await?),
            Command::Status => describe(&self.reader.status().await?),
            Command::Save => {
                let session = self.save().await?;
                format!("Saved at unit {}", session.cursor)
            }
            Command::Clear => {
                self.reader.execute(ReaderAction::Clear).await?;
                self.save().await?;
                "Cleared".to_string()
            }
            Command::Open(path) => {
                let text = read_document(&path).await?;
                let status = self.reader.execute(ReaderAction::Load(text)).await?;
                self.save().await?;
                format!("Loaded {} ({} units)", path.display(), status.total)
            }
            Command::Say(text) => {
                self.reader.execute(ReaderAction::Load(text)).await?;
                describe(&self.reader.execute(ReaderAction::Play).await?)
            }
            Command::Voice(None) => {
                let status = self.reader.status().await?;
                match &status.voice.voice {
                    Some(selection) => self.voice_label(selection),
                    None => "Engine default voice".to_string(),
                }
            }
            Command::Voice(Some(id)) => {
                let selection = self.voices.read().resolve(&id)?;
                let label = self.voice_label(&selection);
                self.reader
                    .execute(ReaderAction::SetVoice(Some(selection)))
                    .await?;
                format!("Voice: {}", label)
            }
            Command::Voices => self.list_voices(),
            Command::RefreshVoices => self.refresh_voices().await?,
            Command::Rate(rate) => {
                let status = self.reader.execute(ReaderAction::SetRate(rate)).await?;
                format!("Rate: {:.1}", status.voice.rate)
            }
            Command::Pitch(pitch) => {
                let status = self.reader.execute(ReaderAction::SetPitch(pitch)).await?;
                format!("Pitch: {:.1}", status.voice.pitch)
            }
            Command::Chunk(size) => {
                let status = self.reader.execute(ReaderAction::SetChunkSize(size)).await?;
                format!("Chunk size: {} (applies on next play)", status.chunk_size)
            }
            Command::Help => HELP.to_string(),
            Command::Quit => return Ok(Flow::Quit),
        };

        Ok(Flow::Continue(message))
    }

    fn voice_label(&self, selection: &VoiceSelection) -> String {
        self.voices
            .read()
            .find(selection.id())
            .map(|v| v.label())
            .unwrap_or_else(|| selection.id().to_string())
    }

    fn list_voices(&self) -> String {
        let voices = self.voices.read();
        let lines: Vec<String> = voices
            .all()
            .map(|v| {
                let marker = match v.kind {
                    VoiceKind::Local => " ",
                    VoiceKind::Remote => "*",
                };
                format!("{} {:<32} {}", marker, v.id, v.label())
            })
            .collect();

        if lines.is_empty() {
            "No voices available".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Voice named in settings, else the preferred voice of the directory
fn initial_voice(voices: &VoiceDirectory, configured: Option<&str>) -> Option<VoiceSelection> {
    if let Some(id) = configured {
        match voices.resolve(id) {
            Ok(selection) => return Some(selection),
            Err(e) => tracing::warn!(voice = id, error = %e, "Configured voice not found"),
        }
    }
    voices.preferred().map(|v| v.selection())
}

async fn read_document(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Could not read {}", path.display()))
}

fn describe(status: &ReaderStatus) -> String {
    match status.state {
        PlaybackState::Idle if status.total == 0 => "Nothing loaded".to_string(),
        state => format!(
            "{} at unit {}/{} ({}%)",
            state, status.cursor, status.total, status.percent
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listen_core::VoiceInfo;
    use listen_persistence::MemoryProgressStore;
    use std::time::Duration;

    fn engine() -> SimulatedSpeechEngine {
        SimulatedSpeechEngine::new(
            10.0,
            vec![
                VoiceInfo::local("urn:ava", "Ava", "en-US"),
                VoiceInfo::local("urn:anna", "Anna", "de-DE"),
            ],
        )
    }

    async fn app_with(store: Arc<dyn ProgressStore>) -> App {
        let engine = engine();
        let voices = VoiceDirectory::new(
            engine.voices(),
            vec![VoiceInfo::remote("nova", "Nova", None)],
        );
        app_over(store, engine, None, voices).await
    }

    async fn app_over(
        store: Arc<dyn ProgressStore>,
        engine: SimulatedSpeechEngine,
        catalog: Option<String>,
        voices: VoiceDirectory,
    ) -> App {
        let engine: Arc<dyn SpeechEngine> = Arc::new(engine);
        let local: Arc<dyn SynthesisBackend> = Arc::new(LocalVoiceBackend::new(engine.clone()));
        let mut config = SequencerConfig::default();
        config.voice.voice = initial_voice(&voices, None);

        let sources = VoiceSources { engine, catalog };
        App::with_parts(Backends::new(local.clone(), local), config, store, sources, voices)
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_say_reads_and_save_persists() {
        let store = Arc::new(MemoryProgressStore::new());
        let app = app_with(store.clone()).await;

        let flow = app.handle(Command::Say("One. Two.".to_string())).await.unwrap();
        assert_eq!(flow, Flow::Continue("speaking at unit 0/3 (0%)".to_string()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        app.handle(Command::Save).await.unwrap();

        let saved = store.load().await.unwrap();
        assert_eq!(saved.text, "One. Two.");
        assert_eq!(saved.cursor, 3);
        assert_eq!(saved.voice, Some(VoiceSelection::Local("urn:ava".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restores_saved_session() {
        let store = Arc::new(MemoryProgressStore::new());
        store
            .save(&PersistedSession {
                text: "One. Two. Three.".to_string(),
                cursor: 1,
                voice: Some(VoiceSelection::Remote("retired".to_string())),
                ..PersistedSession::default()
            })
            .await
            .unwrap();

        let app = app_with(store).await;
        let status = app.reader().status().await.unwrap();
        assert_eq!(status.cursor, 1);
        assert_eq!(status.total, 4);
        // Unknown saved voice falls back to the preferred one
        assert_eq!(status.voice.voice, Some(VoiceSelection::Local("urn:ava".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_selection() {
        let app = app_with(Arc::new(MemoryProgressStore::new())).await;

        let flow = app.handle(Command::Voice(Some("nova".to_string()))).await.unwrap();
        assert_eq!(flow, Flow::Continue("Voice: AI: Nova".to_string()));
        assert!(app.handle(Command::Voice(Some("missing".to_string()))).await.is_err());

        let Flow::Continue(listing) = app.handle(Command::Voices).await.unwrap() else {
            panic!("voices should not quit");
        };
        assert_eq!(listing.lines().count(), 3);
        assert!(listing.lines().next().unwrap().contains("Anna (de-DE)"));
    }

    #[tokio::test]
    async fn test_refresh_reloads_both_voice_lists() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("ai-voices.json");
        std::fs::write(&catalog, r#"[{"id":"nova","name":"Nova"}]"#).unwrap();

        let engine = engine();
        let sources = VoiceSources {
            engine: Arc::new(engine.clone()),
            catalog: Some(catalog.display().to_string()),
        };
        let voices = sources.load().await;
        let app = app_over(
            Arc::new(MemoryProgressStore::new()),
            engine.clone(),
            sources.catalog.clone(),
            voices,
        )
        .await;
        app.handle(Command::Voice(Some("nova".to_string()))).await.unwrap();

        engine.set_voices(vec![VoiceInfo::local("urn:anna", "Anna", "de-DE")]);
        std::fs::write(
            &catalog,
            r#"[{"id":"onyx","name":"Onyx"},{"id":"alloy","name":"Alloy","lang":"en"}]"#,
        )
        .unwrap();

        let flow = app.handle(Command::RefreshVoices).await.unwrap();
        assert_eq!(flow, Flow::Continue("1 device voices, 2 AI voices".to_string()));

        let Flow::Continue(listing) = app.handle(Command::Voices).await.unwrap() else {
            panic!("voices should not quit");
        };
        assert!(listing.contains("urn:anna"));
        assert!(listing.contains("onyx"));
        assert!(!listing.contains("urn:ava"));
        assert!(!listing.contains("nova"));

        // The selected AI voice left the catalog
        let status = app.reader().status().await.unwrap();
        assert_eq!(status.voice.voice, Some(VoiceSelection::Local("urn:anna".to_string())));
        assert!(app.handle(Command::Voice(Some("nova".to_string()))).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_and_clear_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chapter.txt");
        std::fs::write(&path, "Para one.\n\nPara two.").unwrap();

        let store = Arc::new(MemoryProgressStore::new());
        let app = app_with(store.clone()).await;

        let flow = app.handle(Command::Open(path)).await.unwrap();
        assert!(matches!(flow, Flow::Continue(ref m) if m.ends_with("(4 units)")));
        assert_eq!(store.load().await.unwrap().text, "Para one.\n\nPara two.");

        app.handle(Command::Clear).await.unwrap();
        assert_eq!(store.load().await.unwrap().text, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_and_shutdown_save() {
        let store = Arc::new(MemoryProgressStore::new());
        let app = app_with(store.clone()).await;
        app.handle(Command::Rate(2.0)).await.unwrap();

        assert_eq!(app.handle(Command::Quit).await.unwrap(), Flow::Quit);
        app.shutdown().await.unwrap();
        assert_eq!(store.load().await.unwrap().rate, 2.0);
    }
}
