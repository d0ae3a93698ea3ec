//! Voice selection and voice metadata

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum speaking rate accepted by the backends
pub const MIN_RATE: f32 = 0.1;
/// Maximum speaking rate accepted by the backends
pub const MAX_RATE: f32 = 10.0;
/// Minimum pitch accepted by the backends
pub const MIN_PITCH: f32 = 0.0;
/// Maximum pitch accepted by the backends
pub const MAX_PITCH: f32 = 2.0;

/// Which synthesis backend a voice belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceKind {
    /// On-device synthesis engine
    Local,
    /// Remote AI voice service
    Remote,
}

impl fmt::Display for VoiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceKind::Local => f.write_str("local"),
            VoiceKind::Remote => f.write_str("remote"),
        }
    }
}

/// A chosen voice
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum VoiceSelection {
    /// Voice of the on-device engine
    Local(String),
    /// Voice of the remote synthesis service
    Remote(String),
}

impl VoiceSelection {
    pub fn id(&self) -> &str {
        match self {
            VoiceSelection::Local(id) | VoiceSelection::Remote(id) => id,
        }
    }

    pub fn kind(&self) -> VoiceKind {
        match self {
            VoiceSelection::Local(_) => VoiceKind::Local,
            VoiceSelection::Remote(_) => VoiceKind::Remote,
        }
    }
}

/// Voice metadata as listed by an engine or the remote catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    /// Stable identifier (voice URI for local voices)
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// BCP 47 language tag, when known
    #[serde(default)]
    pub lang: Option<String>,
    /// Backend the voice belongs to
    pub kind: VoiceKind,
}

impl VoiceInfo {
    pub fn local(id: impl Into<String>, name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lang: Some(lang.into()),
            kind: VoiceKind::Local,
        }
    }

    pub fn remote(id: impl Into<String>, name: impl Into<String>, lang: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lang,
            kind: VoiceKind::Remote,
        }
    }

    /// Selection pointing at this voice
    pub fn selection(&self) -> VoiceSelection {
        match self.kind {
            VoiceKind::Local => VoiceSelection::Local(self.id.clone()),
            VoiceKind::Remote => VoiceSelection::Remote(self.id.clone()),
        }
    }

    /// Label shown in voice pickers.
    ///
    /// Local voices only show their language when it is not English; remote
    /// voices are prefixed with `AI:`.
    pub fn label(&self) -> String {
        let lang = self.lang.as_deref().unwrap_or("");
        match self.kind {
            VoiceKind::Local if lang.contains("en") || lang.is_empty() => self.name.clone(),
            VoiceKind::Local => format!("{} ({})", self.name, lang),
            VoiceKind::Remote if lang.is_empty() => format!("AI: {}", self.name),
            VoiceKind::Remote => format!("AI: {} ({})", self.name, lang),
        }
    }
}

/// Voice parameters read at the start of every unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Selected voice; `None` lets the on-device engine pick its default
    #[serde(default)]
    pub voice: Option<VoiceSelection>,
    /// Speaking rate (1.0 = normal)
    pub rate: f32,
    /// Pitch (1.0 = normal)
    pub pitch: f32,
}

impl VoiceSettings {
    /// Backend kind the next unit will be dispatched to
    pub fn kind(&self) -> VoiceKind {
        self.voice
            .as_ref()
            .map(VoiceSelection::kind)
            .unwrap_or(VoiceKind::Local)
    }
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice: None,
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_label_hides_english() {
        let voice = VoiceInfo::local("urn:samantha", "Samantha", "en-US");
        assert_eq!(voice.label(), "Samantha");

        let voice = VoiceInfo::local("urn:amelie", "Amelie", "fr-CA");
        assert_eq!(voice.label(), "Amelie (fr-CA)");
    }

    #[test]
    fn test_remote_label() {
        let voice = VoiceInfo::remote("nova", "Nova", Some("en-GB".to_string()));
        assert_eq!(voice.label(), "AI: Nova (en-GB)");

        let voice = VoiceInfo::remote("echo", "Echo", None);
        assert_eq!(voice.label(), "AI: Echo");
    }

    #[test]
    fn test_selection_kind() {
        let remote = VoiceInfo::remote("nova", "Nova", None).selection();
        assert_eq!(remote, VoiceSelection::Remote("nova".to_string()));
        assert_eq!(remote.kind(), VoiceKind::Remote);
        assert_eq!(remote.id(), "nova");

        let settings = VoiceSettings::default();
        assert_eq!(settings.kind(), VoiceKind::Local);
    }

    #[test]
    fn test_selection_serde_shape() {
        let json = serde_json::to_string(&VoiceSelection::Remote("nova".into())).unwrap();
        assert_eq!(json, r#"{"kind":"remote","id":"nova"}"#);
    }
}
