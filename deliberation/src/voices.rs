//! Voice assignment for panel members.

/// Built-in speech voices, used when no voice ids are configured.
pub const BUILTIN_VOICES: &[&str] = &[
    "marin", "cedar", "alloy", "ash", "ballad", "coral", "echo", "fable", "nova", "onyx", "sage",
    "shimmer", "verse",
];

/// Round-robin voice picker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoicePool {
    configured: Vec<String>,
}

impl VoicePool {
    /// Configured ids are trimmed and deduplicated, keeping first occurrence.
    pub fn new(configured: impl IntoIterator<Item = String>) -> Self {
        let mut ids: Vec<String> = Vec::new();
        for id in configured {
            let id = id.trim();
            if !id.is_empty() && !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
        }
        Self { configured: ids }
    }

    /// Parse a comma- or newline-separated list.
    pub fn from_list(list: &str) -> Self {
        Self::new(list.split([',', '\n']).map(str::to_string))
    }

    pub fn configured(&self) -> &[String] {
        &self.configured
    }

    /// Voice for the panel seat at `index`.
    pub fn voice_for(&self, index: usize) -> String {
        if self.configured.is_empty() {
            BUILTIN_VOICES[index % BUILTIN_VOICES.len()].to_string()
        } else {
            self.configured[index % self.configured.len()].clone()
        }
    }

    /// An explicit voice wins when it is not blank.
    pub fn resolve(&self, explicit: Option<&str>, index: usize) -> String {
        match explicit.map(str::trim) {
            Some(voice) if !voice.is_empty() => voice.to_string(),
            _ => self.voice_for(index),
        }
    }
}
