//! Voice catalog
//!
//! Merges the on-device voices with the remote AI voice catalog.

use serde::Deserialize;
use std::path::Path;

use listen_core::{VoiceInfo, VoiceKind, VoiceSelection};

use crate::tts::SpeechEngine;
use crate::PipelineError;

/// Entry of the remote catalog
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: String,
    name: String,
    #[serde(default)]
    lang: Option<String>,
}

/// Read the remote voice catalog from an `http(s)://` URL or a file path
pub async fn fetch_remote_voices(location: &str) -> Result<Vec<VoiceInfo>, PipelineError> {
    let body = if location.starts_with("http://") || location.starts_with("https://") {
        let response = reqwest::get(location).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Http {
                status: status.as_u16(),
            });
        }
        response.text().await?
    } else {
        tokio::fs::read_to_string(Path::new(location))
            .await
            .map_err(|e| PipelineError::Catalog(format!("{}: {}", location, e)))?
    };

    let entries: Vec<CatalogEntry> =
        serde_json::from_str(&body).map_err(|e| PipelineError::Catalog(e.to_string()))?;

    Ok(entries
        .into_iter()
        .map(|e| VoiceInfo::remote(e.id, e.name, e.lang.filter(|l| !l.is_empty())))
        .collect())
}

/// Load the remote catalog, falling back to no remote voices on failure
pub async fn load_remote_voices(location: &str) -> Vec<VoiceInfo> {
    match fetch_remote_voices(location).await {
        Ok(voices) => {
            tracing::info!(location, count = voices.len(), "Loaded AI voice catalog");
            voices
        }
        Err(e) => {
            tracing::warn!(location, error = %e, "AI voice catalog unavailable");
            Vec::new()
        }
    }
}

/// All voices the reader can offer
#[derive(Debug, Clone, Default)]
pub struct VoiceDirectory {
    local: Vec<VoiceInfo>,
    remote: Vec<VoiceInfo>,
}

impl VoiceDirectory {
    pub fn new(local: Vec<VoiceInfo>, remote: Vec<VoiceInfo>) -> Self {
        let mut directory = Self {
            local: Vec::new(),
            remote,
        };
        directory.set_local(local);
        directory
    }

    /// Re-enumerate the engine's voices
    pub fn refresh_local(&mut self, engine: &dyn SpeechEngine) {
        self.set_local(engine.voices());
    }

    fn set_local(&mut self, mut voices: Vec<VoiceInfo>) {
        voices.sort_by(|a, b| a.name.cmp(&b.name));
        self.local = voices;
    }

    pub fn set_remote(&mut self, voices: Vec<VoiceInfo>) {
        self.remote = voices;
    }

    pub fn local(&self) -> &[VoiceInfo] {
        &self.local
    }

    pub fn remote(&self) -> &[VoiceInfo] {
        &self.remote
    }

    /// Local voices first, then the AI voices
    pub fn all(&self) -> impl Iterator<Item = &VoiceInfo> {
        self.local.iter().chain(self.remote.iter())
    }

    pub fn find(&self, id: &str) -> Option<&VoiceInfo> {
        self.all().find(|v| v.id == id)
    }

    /// Default voice: first English local voice, else the first local, else
    /// the first AI voice
    pub fn preferred(&self) -> Option<&VoiceInfo> {
        self.local
            .iter()
            .find(|v| v.lang.as_deref().is_some_and(|l| l.starts_with("en")))
            .or_else(|| self.local.first())
            .or_else(|| self.remote.first())
    }

    /// Turn a stored voice id into a selection
    pub fn resolve(&self, id: &str) -> Result<VoiceSelection, PipelineError> {
        self.find(id)
            .map(VoiceInfo::selection)
            .ok_or_else(|| PipelineError::InvalidVoice(id.to_string()))
    }

    /// Whether a selection still names a known voice
    pub fn contains(&self, selection: &VoiceSelection) -> bool {
        let pool = match selection.kind() {
            VoiceKind::Local => &self.local,
            VoiceKind::Remote => &self.remote,
        };
        pool.iter().any(|v| v.id == selection.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use std::io::Write;

    fn directory() -> VoiceDirectory {
        VoiceDirectory::new(
            vec![
                VoiceInfo::local("urn:thomas", "Thomas", "fr-FR"),
                VoiceInfo::local("urn:samantha", "Samantha", "en-US"),
                VoiceInfo::local("urn:anna", "Anna", "de-DE"),
            ],
            vec![VoiceInfo::remote("nova", "Nova", Some("en-US".to_string()))],
        )
    }

    #[test]
    fn test_local_voices_sorted_by_name() {
        let dir = directory();
        let names: Vec<&str> = dir.local().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Anna", "Samantha", "Thomas"]);
    }

    #[test]
    fn test_preferred_is_first_english_local() {
        assert_eq!(directory().preferred().unwrap().id, "urn:samantha");

        let only_remote = VoiceDirectory::new(
            Vec::new(),
            vec![VoiceInfo::remote("nova", "Nova", None)],
        );
        assert_eq!(only_remote.preferred().unwrap().id, "nova");

        let no_english = VoiceDirectory::new(vec![VoiceInfo::local("urn:anna", "Anna", "de-DE")], Vec::new());
        assert_eq!(no_english.preferred().unwrap().id, "urn:anna");

        assert!(VoiceDirectory::default().preferred().is_none());
    }

    #[test]
    fn test_resolve() {
        let directory = directory();
        assert_eq!(
            directory.resolve("nova").unwrap(),
            VoiceSelection::Remote("nova".to_string())
        );
        assert_eq!(
            directory.resolve("urn:anna").unwrap(),
            VoiceSelection::Local("urn:anna".to_string())
        );
        assert!(matches!(directory.resolve("gone"), Err(PipelineError::InvalidVoice(_))));
        assert!(directory.contains(&VoiceSelection::Remote("nova".to_string())));
        assert!(!directory.contains(&VoiceSelection::Local("nova".to_string())));
    }

    #[tokio::test]
    async fn test_catalog_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":"nova","name":"Nova","lang":"en-US"}},{{"id":"echo","name":"Echo"}}]"#
        )
        .unwrap();

        let voices = load_remote_voices(&file.path().to_string_lossy()).await;
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].label(), "AI: Nova (en-US)");
        assert_eq!(voices[1].label(), "AI: Echo");
        assert!(voices.iter().all(|v| v.kind == VoiceKind::Remote));
    }

    #[tokio::test]
    async fn test_catalog_from_url() {
        let app = Router::new().route(
            "/ai-voices.json",
            get(|| async { r#"[{"id":"onyx","name":"Onyx"}]"# }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let voices = load_remote_voices(&format!("http://{}/ai-voices.json", addr)).await;
        assert_eq!(voices, vec![VoiceInfo::remote("onyx", "Onyx", None)]);
    }

    #[tokio::test]
    async fn test_broken_catalog_degrades_to_empty() {
        assert!(load_remote_voices("/definitely/not/here.json").await.is_empty());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let result = fetch_remote_voices(&file.path().to_string_lossy()).await;
        assert!(matches!(result, Err(PipelineError::Catalog(_))));
    }
}
