//! Turns and the frozen context each round is generated against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stance::{self, ParsedStance, Stance};

/// One participant's contribution to one round.
///
/// Created empty at turn start, grown by token deltas, finalized exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub participant_id: String,
    pub round: u32,
    pub raw_text: String,
    pub display_text: String,
    pub spoken_text: String,
    pub stance: Option<Stance>,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

/// A second `finalize` call on the same turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlreadyFinalized {
    pub turn_id: String,
}

impl std::fmt::Display for AlreadyFinalized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "turn {} was already finalized", self.turn_id)
    }
}

impl std::error::Error for AlreadyFinalized {}

impl Turn {
    pub fn new(participant_id: &str, round: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            participant_id: participant_id.to_string(),
            round,
            raw_text: String::new(),
            display_text: String::new(),
            spoken_text: String::new(),
            stance: None,
            created_at: Utc::now(),
            finalized_at: None,
        }
    }

    pub fn push_token(&mut self, token: &str) {
        self.raw_text.push_str(token);
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }

    /// Run the stance parser over the accumulated text and freeze the turn.
    pub fn finalize(&mut self) -> Result<&Self, AlreadyFinalized> {
        if self.is_finalized() {
            return Err(AlreadyFinalized {
                turn_id: self.id.clone(),
            });
        }
        let ParsedStance {
            display_text,
            spoken_text,
            stance,
            ..
        } = stance::parse(&self.raw_text);
        self.display_text = display_text;
        self.spoken_text = spoken_text;
        self.stance = stance;
        self.finalized_at = Some(Utc::now());
        Ok(self)
    }
}

/// A finalized turn as other participants see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnExcerpt {
    pub participant_id: String,
    pub participant_name: String,
    pub round: u32,
    pub text: String,
}

/// Read-only view of the deliberation handed to every turn of a round.
///
/// Holds every turn finalized in rounds `1..round` plus the single most
/// recently finalized turn. Identical for all participants of the round, so
/// nobody reacts to a same-round peer until the next round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub round: u32,
    pub prior_turns: Vec<TurnExcerpt>,
    pub last_turn: Option<TurnExcerpt>,
}

impl ContextSnapshot {
    pub fn is_empty(&self) -> bool {
        self.prior_turns.is_empty()
    }

    /// The turn `participant_id` should answer directly: the last finalized
    /// turn, or when they wrote it themselves, the latest turn of that round
    /// by someone else.
    pub fn addressee_for(&self, participant_id: &str) -> Option<&TurnExcerpt> {
        let last = self.last_turn.as_ref()?;
        if last.participant_id != participant_id {
            return Some(last);
        }
        self.prior_turns
            .iter()
            .rev()
            .find(|t| t.round == last.round && t.participant_id != participant_id)
    }

    /// Up to `limit` most recent prior turns, excluding the direct-address
    /// turn when one is present.
    pub fn recent_history(&self, limit: usize) -> &[TurnExcerpt] {
        let end = if self.last_turn.is_some() {
            self.prior_turns.len().saturating_sub(1)
        } else {
            self.prior_turns.len()
        };
        let start = end.saturating_sub(limit);
        &self.prior_turns[start..end]
    }
}
