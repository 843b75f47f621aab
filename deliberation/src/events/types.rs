//! Progress events: the wire contract between the scheduler and clients.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::session::Participant;
use crate::stance::Stance;
use crate::tally::TallyOutcome;

/// One participant's headline argument, as extracted into the verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KeyArgument {
    pub participant_id: String,
    pub argument: String,
}

/// All session progress events, in the order a session can emit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The panel has been seated.
    ParticipantsReady { participants: Vec<Participant> },

    /// Shared web lookup started.
    LookupStart { query: String },

    /// Shared web lookup finished, whether or not it found anything.
    LookupDone { found: bool },

    /// A round begins.
    RoundStart { round: u32, total_rounds: u32 },

    /// A participant starts speaking.
    TurnStart {
        participant_id: String,
        turn_id: String,
        round: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voice_id: Option<String>,
    },

    /// A streamed text delta of a turn.
    TurnToken {
        participant_id: String,
        turn_id: String,
        token: String,
    },

    /// A turn was finalized.
    TurnDone {
        participant_id: String,
        turn_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stance: Option<Stance>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spoken_text: Option<String>,
    },

    /// A streamed text delta of the synthesis.
    SummaryToken { token: String },

    /// The synthesis finished streaming.
    SummaryDone,

    /// Verdict, bound to the tally counts carried alongside it.
    DecisionReady {
        decision: String,
        confidence: f64,
        key_arguments: Vec<KeyArgument>,
        outcome: TallyOutcome,
        for_count: u32,
        against_count: u32,
        total_voters: u32,
    },

    /// Terminal: the session completed.
    SessionDone,

    /// Terminal: the session failed.
    SessionError { message: String },
}

impl ProgressEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ParticipantsReady { .. } => "participants_ready",
            Self::LookupStart { .. } => "lookup_start",
            Self::LookupDone { .. } => "lookup_done",
            Self::RoundStart { .. } => "round_start",
            Self::TurnStart { .. } => "turn_start",
            Self::TurnToken { .. } => "turn_token",
            Self::TurnDone { .. } => "turn_done",
            Self::SummaryToken { .. } => "summary_token",
            Self::SummaryDone => "summary_done",
            Self::DecisionReady { .. } => "decision_ready",
            Self::SessionDone => "session_done",
            Self::SessionError { .. } => "session_error",
        }
    }

    /// Get the turn ID if this event is turn-scoped
    pub fn turn_id(&self) -> Option<&str> {
        match self {
            Self::TurnStart { turn_id, .. }
            | Self::TurnToken { turn_id, .. }
            | Self::TurnDone { turn_id, .. } => Some(turn_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionDone | Self::SessionError { .. })
    }

    /// Serialize to the JSON carried in one SSE `data:` line.
    pub fn to_json(&self) -> String {
        // Every field is a plain string, number, bool or list thereof.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
