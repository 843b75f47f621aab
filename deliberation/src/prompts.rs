//! Prompt assembly for turns, the synthesis and the verdict.
//!
//! Only the structure lives here: which context goes where and how much of
//! it. Every block is truncated to a fixed character budget.

use crate::session::{ContextSnapshot, Participant, TurnExcerpt};
use crate::tally::{TallyOutcome, VerdictConstraint};

/// Prior turns shown as recent history.
pub const HISTORY_WINDOW: usize = 6;
pub const HISTORY_EXCERPT_CHARS: usize = 150;
pub const DIRECT_ADDRESS_CHARS: usize = 200;
pub const WEB_DIGEST_CHARS: usize = 800;
pub const FILE_CONTEXT_CHARS: usize = 3000;

/// Cut `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// What a round asks of each speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundFraming {
    Opening,
    Middle,
    Final,
}

impl RoundFraming {
    pub fn for_round(round: u32, total_rounds: u32) -> Self {
        if round <= 1 {
            Self::Opening
        } else if round >= total_rounds {
            Self::Final
        } else {
            Self::Middle
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Self::Opening => "Opening statement: put your position on the table plainly.",
            Self::Middle => "React to what was just said. Challenge it or build on it.",
            Self::Final => "Closing word: one decisive sentence, nothing new.",
        }
    }
}

/// Everything one turn prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub participant: &'a Participant,
    pub question: &'a str,
    pub round: u32,
    pub total_rounds: u32,
    pub snapshot: &'a ContextSnapshot,
    pub web_digest: Option<&'a str>,
    pub file_context: Option<&'a str>,
}

/// System and user prompt for one turn.
pub fn turn_prompt(ctx: &TurnContext<'_>) -> (String, String) {
    let p = ctx.participant;
    let system = format!(
        "You are {name}, {role}. {perspective}\n\n\
         You are speaking on a live panel. Two or three sentences at most, one point \
         per turn, conversational and pointed.\n\n\
         Right after your stance tag add one short parenthetical delivery cue, such as \
         (firmly), (wryly) or (with quiet conviction). It is read by the voice engine \
         and never shown, so do not explain it.",
        name = p.name,
        role = p.role,
        perspective = p.perspective,
    );

    let mut user = format!("Question under debate: \"{}\"", ctx.question);

    if let Some(digest) = ctx.web_digest.filter(|d| !d.trim().is_empty()) {
        user.push_str("\n\nBackground research:\n");
        user.push_str(truncate_chars(digest, WEB_DIGEST_CHARS));
    }
    if let Some(files) = ctx.file_context.filter(|f| !f.trim().is_empty()) {
        user.push_str("\n\nDocuments supplied by the user:\n");
        user.push_str(truncate_chars(files, FILE_CONTEXT_CHARS));
    }

    user.push_str(&format!(
        "\n\nRound {} of {}. {}",
        ctx.round,
        ctx.total_rounds,
        RoundFraming::for_round(ctx.round, ctx.total_rounds).instruction()
    ));

    let history = ctx.snapshot.recent_history(HISTORY_WINDOW);
    if !history.is_empty() {
        user.push_str("\n\nEarlier in the debate:");
        for excerpt in history {
            user.push_str(&format!(
                "\n{}: {}",
                excerpt.participant_name,
                truncate_chars(&excerpt.text, HISTORY_EXCERPT_CHARS)
            ));
        }
    }

    if ctx.round > 1 {
        if let Some(last) = ctx.snapshot.addressee_for(&p.id) {
            user.push_str(&format!(
                "\n\n{} just said: \"{}\"\nAddress them by name, then make your point.",
                last.participant_name,
                truncate_chars(&last.text, DIRECT_ADDRESS_CHARS)
            ));
        }
    }

    user.push_str(
        "\n\nBegin with [STANCE: X], X from 1 (strongly disagree) to 6 (strongly agree), \
         then your delivery cue, then your statement:",
    );
    (system, user)
}

/// System and user prompt for the streamed synthesis.
pub fn summary_prompt(
    question: &str,
    transcript: &[TurnExcerpt],
    file_context: Option<&str>,
) -> (String, String) {
    let system = "You are an impartial analyst. Distill a debate into its strongest \
                  arguments, its points of convergence and a clear bottom line."
        .to_string();

    let body = transcript
        .iter()
        .map(|t| format!("[Round {}] {}:\n{}", t.round, t.participant_name, t.text))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let mut user = format!("Question: \"{question}\"");
    if let Some(files) = file_context.filter(|f| !f.trim().is_empty()) {
        user.push_str("\n\nReference documents:\n");
        user.push_str(truncate_chars(files, FILE_CONTEXT_CHARS));
    }
    user.push_str("\n\nTranscript:\n");
    user.push_str(&body);
    user.push_str(
        "\n\nWrite a synthesis of four to six paragraphs: the best case made by each side, \
         where the panel converged, how well the reasoning held up, and a direct conclusion.",
    );
    (system, user)
}

fn outcome_phrase(outcome: TallyOutcome) -> &'static str {
    match outcome {
        TallyOutcome::For => "FOR: the panel answers yes",
        TallyOutcome::Against => "AGAINST: the panel answers no",
        TallyOutcome::Tie => "TIE: the panel is evenly split",
    }
}

/// System and user prompt for the structured verdict.
///
/// The constraint is embedded as literal JSON; the instructions only restate
/// it.
pub fn verdict_prompt(
    question: &str,
    summary: &str,
    constraint: &VerdictConstraint,
) -> (String, String) {
    let system = "You turn a finished debate into a structured verdict. The vote tally you \
                  are given is binding: the verdict must state its outcome and may not \
                  contradict its counts."
        .to_string();

    let tally_json =
        serde_json::to_string_pretty(constraint).unwrap_or_else(|_| "{}".to_string());
    let ids = constraint
        .final_stances
        .iter()
        .map(|s| s.participant_id.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let user = format!(
        "Question: \"{question}\"\n\n\
         Binding tally:\n{tally_json}\n\n\
         Outcome: {outcome}\n\
         Confidence must fall between {min:.0} and {max:.0}.\n\n\
         Debate synthesis (context only):\n{summary}\n\n\
         Give one key argument per participant, using these ids exactly: {ids}",
        outcome = outcome_phrase(constraint.outcome),
        min = constraint.confidence_band.min,
        max = constraint.confidence_band.max,
    );
    (system, user)
}
