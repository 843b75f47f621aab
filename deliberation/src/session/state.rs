//! Server-side session state machine: phases, transitions, and the
//! append-only turn history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::participant::Participant;
use super::turn::{ContextSnapshot, Turn, TurnExcerpt};

/// Phase of a deliberation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Request accepted, nothing generated yet.
    Created,
    /// Persona synthesis in flight.
    SeatingPanel,
    /// Optional shared web lookup in flight.
    LookingUp,
    /// Rounds are running.
    Deliberating,
    /// Synthesis text is streaming.
    Summarizing,
    /// Tally computed, verdict generation in flight.
    Deciding,
    /// Terminal success.
    Completed,
    /// Terminal failure or cancellation.
    Failed,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [SessionPhase] {
        match self {
            Self::Created => &[Self::SeatingPanel, Self::Failed],
            Self::SeatingPanel => &[Self::LookingUp, Self::Deliberating, Self::Failed],
            Self::LookingUp => &[Self::Deliberating, Self::Failed],
            Self::Deliberating => &[Self::Summarizing, Self::Failed],
            Self::Summarizing => &[Self::Deciding, Self::Failed],
            Self::Deciding => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::SeatingPanel => write!(f, "seating_panel"),
            Self::LookingUp => write!(f, "looking_up"),
            Self::Deliberating => write!(f, "deliberating"),
            Self::Summarizing => write!(f, "summarizing"),
            Self::Deciding => write!(f, "deciding"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// A session operation that would break one of its invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    InvalidTransition {
        from: SessionPhase,
        to: SessionPhase,
    },
    PanelAlreadySeated,
    EmptyPanel,
    RoundOutOfOrder {
        expected: u32,
        got: u32,
    },
    RoundOutOfRange {
        round: u32,
        total: u32,
    },
    UnfinalizedTurn(String),
    ForeignTurn {
        turn_id: String,
        round: u32,
    },
    UnknownParticipant(String),
    DuplicateTurn {
        participant_id: String,
        round: u32,
    },
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid transition {} → {}", from, to)
            }
            Self::PanelAlreadySeated => write!(f, "panel already seated"),
            Self::EmptyPanel => write!(f, "panel has no participants"),
            Self::RoundOutOfOrder { expected, got } => {
                write!(f, "expected round {}, got {}", expected, got)
            }
            Self::RoundOutOfRange { round, total } => {
                write!(f, "round {} outside 1..={}", round, total)
            }
            Self::UnfinalizedTurn(id) => write!(f, "turn {} is not finalized", id),
            Self::ForeignTurn { turn_id, round } => {
                write!(f, "turn {} does not belong to round {}", turn_id, round)
            }
            Self::UnknownParticipant(id) => write!(f, "unknown participant {}", id),
            Self::DuplicateTurn {
                participant_id,
                round,
            } => write!(
                f,
                "participant {} already has a turn in round {}",
                participant_id, round
            ),
        }
    }
}

impl std::error::Error for SessionError {}

/// One deliberation: question, seated panel, and append-only history.
///
/// The round scheduler is the only writer; turns reach it through the round
/// barrier, never directly from turn tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub question: String,
    pub total_rounds: u32,
    pub current_round: u32,
    pub phase: SessionPhase,
    participants: Vec<Participant>,
    turns: Vec<Turn>,
    pub transitions: Vec<PhaseTransition>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(question: &str, total_rounds: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            question: question.to_string(),
            total_rounds,
            current_round: 0,
            phase: SessionPhase::Created,
            participants: Vec::new(),
            turns: Vec::new(),
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: SessionPhase, reason: &str) -> Result<(), SessionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(SessionError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Seat the panel. Allowed once.
    pub fn seat_panel(&mut self, participants: Vec<Participant>) -> Result<(), SessionError> {
        if !self.participants.is_empty() {
            return Err(SessionError::PanelAlreadySeated);
        }
        if participants.is_empty() {
            return Err(SessionError::EmptyPanel);
        }
        self.participants = participants;
        Ok(())
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Advance to the next round.
    pub fn begin_round(&mut self, round: u32) -> Result<(), SessionError> {
        if round == 0 || round > self.total_rounds {
            return Err(SessionError::RoundOutOfRange {
                round,
                total: self.total_rounds,
            });
        }
        if round != self.current_round + 1 {
            return Err(SessionError::RoundOutOfOrder {
                expected: self.current_round + 1,
                got: round,
            });
        }
        self.current_round = round;
        Ok(())
    }

    pub fn has_rounds_remaining(&self) -> bool {
        self.current_round < self.total_rounds
    }

    fn excerpt(&self, turn: &Turn) -> TurnExcerpt {
        TurnExcerpt {
            participant_id: turn.participant_id.clone(),
            participant_name: self
                .participant(&turn.participant_id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            round: turn.round,
            text: turn.display_text.clone(),
        }
    }

    /// Every recorded turn as a named excerpt, in recording order.
    pub fn transcript(&self) -> Vec<TurnExcerpt> {
        self.turns.iter().map(|t| self.excerpt(t)).collect()
    }

    /// Freeze the context for the current round.
    pub fn snapshot(&self) -> ContextSnapshot {
        let prior_turns: Vec<TurnExcerpt> = self
            .turns
            .iter()
            .filter(|t| t.round < self.current_round)
            .map(|t| self.excerpt(t))
            .collect();
        let last_turn = self.turns.last().map(|t| self.excerpt(t));
        ContextSnapshot {
            round: self.current_round,
            prior_turns,
            last_turn,
        }
    }

    /// Append the finalized turns of the current round, in completion order.
    ///
    /// The whole batch is checked before anything is appended.
    pub fn record_round(&mut self, turns: Vec<Turn>) -> Result<(), SessionError> {
        let round = self.current_round;
        let mut seen: Vec<&str> = Vec::with_capacity(turns.len());
        for turn in &turns {
            if !turn.is_finalized() {
                return Err(SessionError::UnfinalizedTurn(turn.id.clone()));
            }
            if turn.round != round {
                return Err(SessionError::ForeignTurn {
                    turn_id: turn.id.clone(),
                    round,
                });
            }
            if self.participant(&turn.participant_id).is_none() {
                return Err(SessionError::UnknownParticipant(turn.participant_id.clone()));
            }
            let duplicate = seen.contains(&turn.participant_id.as_str())
                || self
                    .turns
                    .iter()
                    .any(|t| t.round == round && t.participant_id == turn.participant_id);
            if duplicate {
                return Err(SessionError::DuplicateTurn {
                    participant_id: turn.participant_id.clone(),
                    round,
                });
            }
            seen.push(&turn.participant_id);
        }
        self.turns.extend(turns);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] round {}/{} | {} turns | {} participants",
            self.phase,
            self.current_round,
            self.total_rounds,
            self.turns.len(),
            self.participants.len()
        )
    }
}
