//! Session record storage

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

use listen_core::PersistedSession;

use crate::PersistenceError;

/// Durable storage for the reading session
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Overwrite the stored record
    async fn save(&self, session: &PersistedSession) -> Result<(), PersistenceError>;

    /// Stored record, or `None` when absent or unreadable
    async fn load(&self) -> Option<PersistedSession>;
}

/// Stores the session as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    dir: PathBuf,
    key: String,
}

impl FileProgressStore {
    pub fn new(dir: impl Into<PathBuf>, key: impl Into<String>) -> Result<Self, PersistenceError> {
        let key = key.into();
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(PersistenceError::InvalidKey(key));
        }
        Ok(Self {
            dir: dir.into(),
            key,
        })
    }

    /// Location of the record
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.key))
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", self.key))
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn save(&self, session: &PersistedSession) -> Result<(), PersistenceError> {
        let record = session.clone().stamped();
        let json = serde_json::to_vec_pretty(&record)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &json).await?;
        tokio::fs::rename(&temp, self.path()).await?;

        tracing::debug!(
            path = %self.path().display(),
            cursor = record.cursor,
            chars = record.text.chars().count(),
            "Session saved"
        );
        Ok(())
    }

    async fn load(&self) -> Option<PersistedSession> {
        let path = self.path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not read saved session");
                return None;
            }
        };
        parse_record(&bytes, &path)
    }
}

fn parse_record(bytes: &[u8], path: &Path) -> Option<PersistedSession> {
    match serde_json::from_slice::<PersistedSession>(bytes) {
        Ok(session) => Some(session.normalized()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed saved session");
            None
        }
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    record: Mutex<Option<PersistedSession>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn save(&self, session: &PersistedSession) -> Result<(), PersistenceError> {
        *self.record.lock() = Some(session.clone().stamped());
        Ok(())
    }

    async fn load(&self) -> Option<PersistedSession> {
        self.record.lock().clone().map(PersistedSession::normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listen_core::{VoiceSelection, DEFAULT_CHUNK_SIZE, SESSION_KEY};

    fn session() -> PersistedSession {
        PersistedSession {
            text: "Hello world. Bye now.".to_string(),
            cursor: 2,
            rate: 1.25,
            pitch: 0.8,
            chunk_size: 120,
            voice: Some(VoiceSelection::Remote("nova".to_string())),
            saved_at: None,
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path(), SESSION_KEY).unwrap();

        store.save(&session()).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded.text, "Hello world. Bye now.");
        assert_eq!(loaded.cursor, 2);
        assert_eq!(loaded.rate, 1.25);
        assert_eq!(loaded.chunk_size, 120);
        assert_eq!(loaded.voice, Some(VoiceSelection::Remote("nova".to_string())));
        assert!(loaded.saved_at.is_some());
        assert!(!dir.path().join(".listen_state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path().join("nested"), "progress").unwrap();

        store.save(&session()).await.unwrap();
        let mut next = session();
        next.cursor = 0;
        next.text = "Other.".to_string();
        store.save(&next).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.cursor, 0);
        assert_eq!(loaded.text, "Other.");
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path(), SESSION_KEY).unwrap();
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path(), SESSION_KEY).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_partial_record_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path(), SESSION_KEY).unwrap();
        std::fs::write(store.path(), r#"{"text":"Saved text.","chunkSize":0,"rate":0}"#).unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.text, "Saved text.");
        assert_eq!(loaded.cursor, 0);
        assert_eq!(loaded.rate, 1.0);
        assert_eq!(loaded.pitch, 1.0);
        assert_eq!(loaded.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(loaded.voice, None);
    }

    #[tokio::test]
    async fn test_record_uses_legacy_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path(), SESSION_KEY).unwrap();
        store.save(&session()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["index"], 2);
        assert_eq!(raw["chunkSize"], 120);
        assert!(raw.get("savedAt").is_some());
    }

    #[test]
    fn test_rejects_unsafe_keys() {
        assert!(FileProgressStore::new("/tmp", "").is_err());
        assert!(FileProgressStore::new("/tmp", "../escape").is_err());
        assert!(FileProgressStore::new("/tmp", ".hidden").is_err());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryProgressStore::new();
        assert!(store.load().await.is_none());

        store.save(&session()).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.cursor, 2);
        assert!(loaded.saved_at.is_some());
    }
}
