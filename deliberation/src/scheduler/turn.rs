//! One participant's turn in one round.

use std::sync::Arc;

use futures::StreamExt;
use tracing::debug;

use crate::errors::{DeliberationError, DeliberationResult};
use crate::events::{EventSink, ProgressEvent};
use crate::generation::{GenerationService, TextRequest};
use crate::prompts::{turn_prompt, TurnContext};
use crate::session::{ContextSnapshot, Participant, Turn};

/// Output bounds for a single turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnLimits {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            max_tokens: 220,
            temperature: 1.0,
        }
    }
}

/// Inputs shared by every turn of a round. Frozen before the first turn
/// starts.
#[derive(Debug, Clone)]
pub struct RoundContext {
    pub question: Arc<str>,
    pub round: u32,
    pub total_rounds: u32,
    pub snapshot: Arc<ContextSnapshot>,
    pub web_digest: Option<Arc<str>>,
    pub file_context: Option<Arc<str>>,
    pub limits: TurnLimits,
}

pub struct TurnTask {
    participant: Arc<Participant>,
    context: Arc<RoundContext>,
}

impl TurnTask {
    pub fn new(participant: Arc<Participant>, context: Arc<RoundContext>) -> Self {
        Self {
            participant,
            context,
        }
    }

    /// Stream the turn, forwarding each token as it arrives, then finalize.
    ///
    /// Never touches session state; the finalized turn is handed back through
    /// the round barrier.
    pub async fn run(
        self,
        generator: Arc<dyn GenerationService>,
        sink: EventSink,
    ) -> DeliberationResult<Turn> {
        let ctx = &self.context;
        let participant = &self.participant;
        let mut turn = Turn::new(&participant.id, ctx.round);

        sink.emit(ProgressEvent::TurnStart {
            participant_id: participant.id.clone(),
            turn_id: turn.id.clone(),
            round: ctx.round,
            voice_id: participant.voice_id.clone(),
        });

        let (system, prompt) = turn_prompt(&TurnContext {
            participant,
            question: &ctx.question,
            round: ctx.round,
            total_rounds: ctx.total_rounds,
            snapshot: &ctx.snapshot,
            web_digest: ctx.web_digest.as_deref(),
            file_context: ctx.file_context.as_deref(),
        });

        let stage = || format!("round {} turn for {}", ctx.round, participant.name);
        let mut tokens = generator
            .stream_text(TextRequest {
                system,
                prompt,
                max_tokens: ctx.limits.max_tokens,
                temperature: ctx.limits.temperature,
            })
            .await
            .map_err(|e| DeliberationError::generation(stage(), e))?;

        while let Some(token) = tokens.next().await {
            let token = token.map_err(|e| DeliberationError::generation(stage(), e))?;
            if token.is_empty() {
                continue;
            }
            turn.push_token(&token);
            sink.emit(ProgressEvent::TurnToken {
                participant_id: participant.id.clone(),
                turn_id: turn.id.clone(),
                token,
            });
        }

        turn.finalize()
            .map_err(|e| DeliberationError::Internal(e.into()))?;
        debug!(
            participant = %participant.name,
            round = ctx.round,
            stance = ?turn.stance.map(|s| s.value()),
            chars = turn.display_text.len(),
            "Turn finalized"
        );

        sink.emit(ProgressEvent::TurnDone {
            participant_id: participant.id.clone(),
            turn_id: turn.id.clone(),
            stance: turn.stance,
            spoken_text: Some(turn.spoken_text.clone()),
        });
        Ok(turn)
    }
}
