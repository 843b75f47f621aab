//! Ordering rules for a captured event log.
//!
//! Used by tests and by the CLI to check a transcript after the fact. The
//! rules:
//!
//! - exactly one terminal event, and it is the last one;
//! - per turn id: `turn_start` precedes every `turn_token`, and exactly one
//!   `turn_done` follows;
//! - `round_start` values never decrease, and no turn of an earlier round is
//!   still open when the next `round_start` arrives;
//! - a turn's `round` equals the most recent `round_start`;
//! - every turn is closed before `session_done`. A `session_error` may cut
//!   turns short.

use std::collections::{HashMap, HashSet};

use crate::errors::{DeliberationError, DeliberationResult};

use super::types::ProgressEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Open,
    Done,
}

fn violation(index: usize, message: impl std::fmt::Display) -> DeliberationError {
    DeliberationError::Protocol(format!("event {index}: {message}"))
}

/// Check a complete event log against the stream ordering rules.
pub fn validate(events: &[ProgressEvent]) -> DeliberationResult<()> {
    let mut current_round: Option<u32> = None;
    let mut turns: HashMap<&str, TurnState> = HashMap::new();
    let mut open: HashSet<&str> = HashSet::new();
    let mut terminal_seen = false;

    for (index, event) in events.iter().enumerate() {
        if terminal_seen {
            return Err(violation(
                index,
                format!("`{}` after terminal event", event.event_type()),
            ));
        }

        match event {
            ProgressEvent::RoundStart { round, .. } => {
                if let Some(previous) = current_round {
                    if *round < previous {
                        return Err(violation(
                            index,
                            format!("round {round} started after round {previous}"),
                        ));
                    }
                }
                if let Some(turn_id) = open.iter().next() {
                    return Err(violation(
                        index,
                        format!("round {round} started while turn {turn_id} is open"),
                    ));
                }
                current_round = Some(*round);
            }
            ProgressEvent::TurnStart { turn_id, round, .. } => {
                if turns.contains_key(turn_id.as_str()) {
                    return Err(violation(index, format!("turn {turn_id} started twice")));
                }
                if current_round != Some(*round) {
                    return Err(violation(
                        index,
                        format!(
                            "turn {turn_id} claims round {round} but current round is {current_round:?}"
                        ),
                    ));
                }
                turns.insert(turn_id.as_str(), TurnState::Open);
                open.insert(turn_id.as_str());
            }
            ProgressEvent::TurnToken { turn_id, .. } => match turns.get(turn_id.as_str()) {
                Some(TurnState::Open) => {}
                Some(TurnState::Done) => {
                    return Err(violation(index, format!("token for finished turn {turn_id}")));
                }
                None => {
                    return Err(violation(index, format!("token before start of turn {turn_id}")));
                }
            },
            ProgressEvent::TurnDone { turn_id, .. } => match turns.get(turn_id.as_str()) {
                Some(TurnState::Open) => {
                    turns.insert(turn_id.as_str(), TurnState::Done);
                    open.remove(turn_id.as_str());
                }
                Some(TurnState::Done) => {
                    return Err(violation(index, format!("turn {turn_id} finished twice")));
                }
                None => {
                    return Err(violation(index, format!("turn {turn_id} finished before starting")));
                }
            },
            ProgressEvent::SessionDone => {
                if let Some(turn_id) = open.iter().next() {
                    return Err(violation(
                        index,
                        format!("session_done while turn {turn_id} is open"),
                    ));
                }
                terminal_seen = true;
            }
            ProgressEvent::SessionError { .. } => terminal_seen = true,
            _ => {}
        }
    }

    if !terminal_seen {
        return Err(DeliberationError::Protocol(
            "log has no terminal event".to_string(),
        ));
    }
    Ok(())
}
