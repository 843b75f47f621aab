//! Panel synthesis.
//!
//! Personas are produced by one structured generation call. Caller-supplied
//! specs pin the panel's size, order and names; the generated drafts only
//! fill in roles and perspectives.

use std::collections::{HashMap, HashSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{DeliberationError, DeliberationResult};
use crate::generation::{generate_structured, GenerationService};
use crate::session::{normalize_name, Participant, ParticipantSpec};
use crate::voices::VoicePool;

const PERSONA_MAX_TOKENS: u32 = 1500;
const PERSONA_TEMPERATURE: f32 = 0.9;

/// One persona as returned by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PersonaDraft {
    /// Short snake_case identifier.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    /// Two or three sentences describing the viewpoint.
    #[serde(default)]
    pub perspective: String,
}

/// Structured output of the persona call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PersonaBatch {
    pub personas: Vec<PersonaDraft>,
}

/// Panel size when the caller gives no specs.
pub fn panel_size_for(question: &str) -> usize {
    let lower = question.to_lowercase();
    if lower.contains("supreme court") || lower.contains("justices") {
        9
    } else if ["senate", "congress", "committee"]
        .iter()
        .any(|body| lower.contains(body))
    {
        5
    } else {
        4
    }
}

fn persona_prompt(question: &str, count: usize, specs: &[ParticipantSpec]) -> (String, String) {
    if specs.is_empty() {
        let system = format!(
            "You assemble deliberation panels. Produce {count} members whose viewpoints \
             genuinely differ, drawn from distinct disciplines and convictions."
        );
        let user = format!(
            "Question: \"{question}\"\n\n\
             Create {count} panel members for this question. Avoid a plain pro/con split; \
             give each a memorable name, a concrete role and a perspective of two or three \
             sentences. Use a snake_case id for each."
        );
        return (system, user);
    }

    let roster = specs
        .iter()
        .enumerate()
        .map(|(i, s)| {
            if s.description.is_empty() {
                format!("{}. {}", i + 1, s.name)
            } else {
                format!("{}. {}: {}", i + 1, s.name, s.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    let system = "You assemble deliberation panels. Flesh out the members the user named \
                  with a role and a distinct perspective relevant to the question."
        .to_string();
    let user = format!(
        "Question: \"{question}\"\n\nRequested members:\n{roster}\n\n\
         Return exactly {count} members, in this order, keeping every name exactly as given."
    );
    (system, user)
}

fn slug(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Ensure ids are non-empty and unique, in panel order.
fn dedupe_ids(participants: &mut [Participant]) {
    let mut seen = HashSet::new();
    for participant in participants.iter_mut() {
        let mut base = slug(&participant.id);
        if base.is_empty() {
            base = slug(&participant.name);
        }
        if base.is_empty() {
            base = short_id();
        }
        let mut candidate = base.clone();
        let mut n = 2;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        participant.id = candidate;
    }
}

/// Merge generated drafts with caller specs (or take them as-is) and assign
/// voices.
pub fn assemble_panel(
    drafts: Vec<PersonaDraft>,
    specs: &[ParticipantSpec],
    voices: &VoicePool,
) -> Vec<Participant> {
    let mut participants: Vec<Participant> = if specs.is_empty() {
        drafts
            .into_iter()
            .enumerate()
            .map(|(i, d)| Participant {
                id: d.id,
                name: d.name,
                role: d.role,
                perspective: d.perspective,
                voice_id: Some(voices.voice_for(i)),
            })
            .collect()
    } else {
        let by_name: HashMap<String, &PersonaDraft> = drafts
            .iter()
            .map(|d| (normalize_name(&d.name), d))
            .collect();
        specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let draft = by_name
                    .get(&normalize_name(&spec.name))
                    .copied()
                    .or_else(|| drafts.get(i));
                Participant {
                    id: draft.map(|d| d.id.clone()).unwrap_or_default(),
                    name: spec.name.clone(),
                    role: draft.map(|d| d.role.clone()).unwrap_or_default(),
                    perspective: draft
                        .map(|d| d.perspective.clone())
                        .filter(|p| !p.is_empty())
                        .unwrap_or_else(|| spec.description.clone()),
                    voice_id: Some(voices.resolve(spec.voice_id.as_deref(), i)),
                }
            })
            .collect()
    };
    dedupe_ids(&mut participants);
    participants
}

/// Synthesize the panel for a question.
pub async fn synthesize_panel(
    generator: &dyn GenerationService,
    question: &str,
    specs: &[ParticipantSpec],
    voices: &VoicePool,
) -> DeliberationResult<Vec<Participant>> {
    let count = if specs.is_empty() {
        panel_size_for(question)
    } else {
        specs.len()
    };
    let (system, user) = persona_prompt(question, count, specs);
    debug!(count, specified = specs.len(), "Synthesizing panel");

    let batch: PersonaBatch =
        generate_structured(generator, &system, &user, PERSONA_MAX_TOKENS, PERSONA_TEMPERATURE)
            .await
            .map_err(|e| DeliberationError::generation("panel synthesis", e))?;

    let panel = assemble_panel(batch.personas, specs, voices);
    if panel.is_empty() {
        return Err(DeliberationError::generation(
            "panel synthesis",
            crate::errors::GenerationError::Schema {
                schema: "PersonaBatch".to_string(),
                message: "no personas returned".to_string(),
            },
        ));
    }
    info!(
        members = panel.len(),
        names = %panel.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", "),
        "Panel seated"
    );
    Ok(panel)
}
