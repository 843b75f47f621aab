//! Vote tally: the deterministic ground truth behind the verdict.
//!
//! Each participant's vote is the stance from their highest-numbered round
//! that carried one. Stances 4–6 count FOR, 1–3 AGAINST. The tally is computed
//! once after the last round and handed to verdict generation as a
//! [`VerdictConstraint`]; the generated verdict may summarize the outcome but
//! never overrule it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::session::{Participant, Turn};
use crate::stance::Stance;

/// Average reported when nobody recorded a stance (midpoint of 1..=6).
pub const NEUTRAL_AVERAGE: f64 = 3.5;

/// A participant's final recorded stance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalStance {
    pub participant_id: String,
    pub participant_name: String,
    pub stance: Stance,
    /// Round the stance was taken from.
    pub round: u32,
}

/// Outcome of the vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TallyOutcome {
    For,
    Against,
    Tie,
}

impl TallyOutcome {
    pub fn label(self) -> &'static str {
        match self {
            Self::For => "FOR",
            Self::Against => "AGAINST",
            Self::Tie => "TIE",
        }
    }
}

impl std::fmt::Display for TallyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// For/against counts computed from final stances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    pub for_count: u32,
    pub against_count: u32,
    pub total_voters: u32,
    pub average_stance: f64,
    pub final_stances: Vec<FinalStance>,
}

impl VoteTally {
    /// Tally every finalized turn.
    ///
    /// `participants` supplies names and ordering; voters missing from it are
    /// listed after the panel in first-seen order.
    pub fn compute(turns: &[Turn], participants: &[Participant]) -> Self {
        let mut latest: HashMap<&str, (Stance, u32)> = HashMap::new();
        let mut first_seen: Vec<&str> = Vec::new();

        for turn in turns.iter().filter(|t| t.is_finalized()) {
            let Some(stance) = turn.stance else {
                continue;
            };
            match latest.get(turn.participant_id.as_str()) {
                Some((_, round)) if *round >= turn.round => {}
                Some(_) => {
                    latest.insert(&turn.participant_id, (stance, turn.round));
                }
                None => {
                    latest.insert(&turn.participant_id, (stance, turn.round));
                    first_seen.push(&turn.participant_id);
                }
            }
        }

        let panel_order = participants.iter().map(|p| p.id.as_str());
        let strangers = first_seen
            .iter()
            .copied()
            .filter(|id| !participants.iter().any(|p| p.id == *id));

        let final_stances: Vec<FinalStance> = panel_order
            .chain(strangers)
            .filter_map(|id| {
                let (stance, round) = latest.get(id)?;
                let participant_name = participants
                    .iter()
                    .find(|p| p.id == id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| id.to_string());
                Some(FinalStance {
                    participant_id: id.to_string(),
                    participant_name,
                    stance: *stance,
                    round: *round,
                })
            })
            .collect();

        let for_count = final_stances.iter().filter(|s| s.stance.is_for()).count() as u32;
        let total_voters = final_stances.len() as u32;
        let against_count = total_voters - for_count;
        let average_stance = if final_stances.is_empty() {
            NEUTRAL_AVERAGE
        } else {
            final_stances
                .iter()
                .map(|s| f64::from(s.stance.value()))
                .sum::<f64>()
                / f64::from(total_voters)
        };

        Self {
            for_count,
            against_count,
            total_voters,
            average_stance,
            final_stances,
        }
    }

    pub fn outcome(&self) -> TallyOutcome {
        use std::cmp::Ordering;
        match self.for_count.cmp(&self.against_count) {
            Ordering::Greater => TallyOutcome::For,
            Ordering::Less => TallyOutcome::Against,
            Ordering::Equal => TallyOutcome::Tie,
        }
    }

    pub fn margin(&self) -> u32 {
        self.for_count.abs_diff(self.against_count)
    }

    pub fn is_unanimous(&self) -> bool {
        self.total_voters > 0 && (self.for_count == 0 || self.against_count == 0)
    }

    /// Confidence range a verdict on this tally may claim.
    pub fn confidence_band(&self) -> ConfidenceBand {
        if self.outcome() == TallyOutcome::Tie {
            ConfidenceBand { min: 50.0, max: 50.0 }
        } else if self.is_unanimous() {
            ConfidenceBand { min: 90.0, max: 98.0 }
        } else if self.for_count.max(self.against_count) * 3 >= self.total_voters * 2 {
            ConfidenceBand { min: 70.0, max: 85.0 }
        } else {
            ConfidenceBand { min: 50.0, max: 65.0 }
        }
    }

    pub fn constraint(&self) -> VerdictConstraint {
        VerdictConstraint {
            outcome: self.outcome(),
            for_count: self.for_count,
            against_count: self.against_count,
            total_voters: self.total_voters,
            margin: self.margin(),
            average_stance: self.average_stance,
            confidence_band: self.confidence_band(),
            final_stances: self.final_stances.clone(),
        }
    }
}

/// Inclusive confidence range (0–100) implied by a tally's margin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBand {
    pub min: f64,
    pub max: f64,
}

impl ConfidenceBand {
    pub fn clamp(&self, confidence: f64) -> f64 {
        if confidence.is_nan() {
            return self.min;
        }
        confidence.clamp(self.min, self.max)
    }

    pub fn contains(&self, confidence: f64) -> bool {
        (self.min..=self.max).contains(&confidence)
    }
}

/// Literal structured input binding verdict generation to the tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictConstraint {
    pub outcome: TallyOutcome,
    pub for_count: u32,
    pub against_count: u32,
    pub total_voters: u32,
    pub margin: u32,
    pub average_stance: f64,
    pub confidence_band: ConfidenceBand,
    pub final_stances: Vec<FinalStance>,
}
