//! Ready-made panels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::session::ParticipantSpec;

/// `(name, description, voice id)` of each sitting justice, in seniority order.
const SUPREME_COURT_JUSTICES: [(&str, &str, &str); 9] = [
    (
        "John Roberts",
        "Chief Justice, conservative-leaning institutionalist",
        "EqEBRJ3KkHt0wbsc2Fia",
    ),
    (
        "Clarence Thomas",
        "Justice, originalist conservative",
        "1JI8rY42QBfWNaoNefrv",
    ),
    (
        "Samuel Alito",
        "Justice, conservative textualist",
        "ncckttvbVBrTEpm4NMUc",
    ),
    (
        "Sonia Sotomayor",
        "Justice, progressive liberal",
        "zfEs8h6jd9ZyUSvjzwZ8",
    ),
    (
        "Elena Kagan",
        "Justice, pragmatic liberal",
        "BdDD37G3829oBeuAf0OG",
    ),
    (
        "Neil Gorsuch",
        "Justice, libertarian-leaning originalist",
        "0Kt3ReD3i0dKMZ2LHtN5",
    ),
    (
        "Brett Kavanaugh",
        "Justice, conservative centrist",
        "vfqzRYLdmgJWBjEM3lMu",
    ),
    (
        "Amy Coney Barrett",
        "Justice, conservative originalist",
        "KMukBzIHhUsXeFCRpAgt",
    ),
    (
        "Ketanji Brown Jackson",
        "Justice, progressive liberal",
        "jLrDcpqWOpSQHataCFOc",
    ),
];

/// A named panel that can stand in for caller-supplied participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    SupremeCourt,
}

impl Preset {
    pub const ALL: [Preset; 1] = [Preset::SupremeCourt];

    pub fn name(self) -> &'static str {
        match self {
            Self::SupremeCourt => "supreme-court",
        }
    }

    /// The panel, in seating order, with voices assigned.
    pub fn participants(self) -> Vec<ParticipantSpec> {
        match self {
            Self::SupremeCourt => SUPREME_COURT_JUSTICES
                .iter()
                .map(|(name, description, voice)| {
                    ParticipantSpec::new(*name, *description).with_voice(*voice)
                })
                .collect(),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['_', ' '], "-");
        Self::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|p| p.name()).collect();
                format!("unknown preset `{s}` (known: {})", known.join(", "))
            })
    }
}
