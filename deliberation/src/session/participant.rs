//! Panel members.

use serde::{Deserialize, Serialize};

/// One seated member of the panel. Immutable once the session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub role: String,
    pub perspective: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

/// A caller-supplied panel member, before persona synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl ParticipantSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            voice_id: None,
        }
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    /// Parse the CLI shorthand `"Name: description"`.
    pub fn parse_shorthand(input: &str) -> Option<Self> {
        let (name, description) = match input.split_once(':') {
            Some((name, description)) => (name.trim(), description.trim()),
            None => (input.trim(), ""),
        };
        (!name.is_empty()).then(|| Self::new(name, description))
    }
}

/// Case- and whitespace-insensitive name key used to match synthesized
/// personas back to caller specs.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
