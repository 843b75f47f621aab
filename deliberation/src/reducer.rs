//! Client-side state reconstruction.
//!
//! [`SessionView::apply`] is a pure fold over [`ProgressEvent`]s. Every event
//! kind is matched explicitly, so adding a variant is a compile error here
//! until the view knows what to do with it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::events::{KeyArgument, ProgressEvent};
use crate::session::Participant;
use crate::stance::{self, Stance};
use crate::tally::TallyOutcome;

/// Coarse status shown by a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    #[default]
    Idle,
    GeneratingParticipants,
    Searching,
    Debating,
    Summarizing,
    Done,
    Error,
}

impl ViewStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// A turn as the client has seen it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnView {
    pub turn_id: String,
    pub participant_id: String,
    pub round: u32,
    pub voice_id: Option<String>,
    /// Raw streamed text, markup included.
    pub content: String,
    /// Markup-free text. Filled once the turn is done.
    pub display_text: String,
    pub spoken_text: Option<String>,
    pub stance: Option<Stance>,
    pub finalized: bool,
}

/// Final verdict as received from `decision_ready`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictView {
    pub decision: String,
    pub confidence: f64,
    pub key_arguments: Vec<KeyArgument>,
    pub outcome: TallyOutcome,
    pub for_count: u32,
    pub against_count: u32,
    pub total_voters: u32,
}

/// Everything a client knows about one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub question: String,
    pub status: ViewStatus,
    pub participants: Vec<Participant>,
    pub turns: Vec<TurnView>,
    /// Participants with a turn in flight.
    pub active_participants: BTreeSet<String>,
    /// Turn ids in flight.
    pub active_turns: BTreeSet<String>,
    pub round: u32,
    pub total_rounds: u32,
    pub lookup_query: Option<String>,
    pub lookup_found: Option<bool>,
    pub summary: String,
    pub summary_done: bool,
    pub verdict: Option<VerdictView>,
    pub error: Option<String>,
}

impl SessionView {
    /// View for a request that was just submitted.
    pub fn started(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            status: ViewStatus::GeneratingParticipants,
            ..Self::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn turn(&self, turn_id: &str) -> Option<&TurnView> {
        self.turns.iter().find(|t| t.turn_id == turn_id)
    }

    pub fn participant_name(&self, participant_id: &str) -> Option<&str> {
        self.participants
            .iter()
            .find(|p| p.id == participant_id)
            .map(|p| p.name.as_str())
    }

    /// Fold one event into the view.
    pub fn apply(mut self, event: &ProgressEvent) -> Self {
        if self.status.is_terminal() {
            return self;
        }

        match event {
            ProgressEvent::ParticipantsReady { participants } => {
                self.participants = participants.clone();
                self.status = ViewStatus::Debating;
            }
            ProgressEvent::LookupStart { query } => {
                self.lookup_query = Some(query.clone());
                self.status = ViewStatus::Searching;
            }
            ProgressEvent::LookupDone { found } => {
                self.lookup_found = Some(*found);
                self.status = ViewStatus::Debating;
            }
            ProgressEvent::RoundStart {
                round,
                total_rounds,
            } => {
                self.round = *round;
                self.total_rounds = *total_rounds;
                self.status = ViewStatus::Debating;
            }
            ProgressEvent::TurnStart {
                participant_id,
                turn_id,
                round,
                voice_id,
            } => {
                if self.turn(turn_id).is_none() {
                    self.turns.push(TurnView {
                        turn_id: turn_id.clone(),
                        participant_id: participant_id.clone(),
                        round: *round,
                        voice_id: voice_id.clone(),
                        content: String::new(),
                        display_text: String::new(),
                        spoken_text: None,
                        stance: None,
                        finalized: false,
                    });
                    self.active_participants.insert(participant_id.clone());
                    self.active_turns.insert(turn_id.clone());
                }
            }
            ProgressEvent::TurnToken { turn_id, token, .. } => {
                if let Some(turn) = self.turn_mut(turn_id) {
                    if !turn.finalized {
                        turn.content.push_str(token);
                    }
                }
            }
            ProgressEvent::TurnDone {
                participant_id,
                turn_id,
                stance: event_stance,
                spoken_text,
            } => {
                let round = self.round;
                let turn = match self.turns.iter().position(|t| t.turn_id == *turn_id) {
                    Some(index) => &mut self.turns[index],
                    None => {
                        self.turns.push(TurnView {
                            turn_id: turn_id.clone(),
                            participant_id: participant_id.clone(),
                            round,
                            voice_id: None,
                            content: String::new(),
                            display_text: String::new(),
                            spoken_text: None,
                            stance: None,
                            finalized: false,
                        });
                        let last = self.turns.len() - 1;
                        &mut self.turns[last]
                    }
                };
                // The server already stripped markup; strip again in case a
                // directive slipped through.
                let parsed = stance::parse(&turn.content);
                turn.display_text = stance::strip_markup(&parsed.display_text);
                turn.stance = event_stance.or(parsed.stance);
                turn.spoken_text = spoken_text.clone().or(Some(parsed.spoken_text));
                turn.finalized = true;

                self.active_turns.remove(turn_id);
                let still_speaking = self
                    .active_turns
                    .iter()
                    .filter_map(|id| self.turns.iter().find(|t| t.turn_id == *id))
                    .any(|t| t.participant_id == *participant_id);
                if !still_speaking {
                    self.active_participants.remove(participant_id);
                }
            }
            ProgressEvent::SummaryToken { token } => {
                self.summary.push_str(token);
                self.status = ViewStatus::Summarizing;
            }
            ProgressEvent::SummaryDone => {
                self.summary_done = true;
                self.status = ViewStatus::Summarizing;
            }
            ProgressEvent::DecisionReady {
                decision,
                confidence,
                key_arguments,
                outcome,
                for_count,
                against_count,
                total_voters,
            } => {
                self.verdict = Some(VerdictView {
                    decision: decision.clone(),
                    confidence: *confidence,
                    key_arguments: key_arguments.clone(),
                    outcome: *outcome,
                    for_count: *for_count,
                    against_count: *against_count,
                    total_voters: *total_voters,
                });
            }
            ProgressEvent::SessionDone => {
                self.active_turns.clear();
                self.active_participants.clear();
                self.status = ViewStatus::Done;
            }
            ProgressEvent::SessionError { message } => {
                self.active_turns.clear();
                self.active_participants.clear();
                self.error = Some(message.clone());
                self.status = ViewStatus::Error;
            }
        }
        self
    }

    fn turn_mut(&mut self, turn_id: &str) -> Option<&mut TurnView> {
        self.turns.iter_mut().find(|t| t.turn_id == turn_id)
    }
}

/// Fold a whole log from the starting view.
pub fn replay<'a>(
    question: &str,
    events: impl IntoIterator<Item = &'a ProgressEvent>,
) -> SessionView {
    events
        .into_iter()
        .fold(SessionView::started(question), SessionView::apply)
}
