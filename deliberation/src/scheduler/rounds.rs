//! Sequential rounds of concurrent turns.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::barrier::RoundBarrier;
use super::turn::{RoundContext, TurnLimits, TurnTask};
use crate::errors::{DeliberationError, DeliberationResult};
use crate::events::{EventSink, ProgressEvent};
use crate::generation::GenerationService;
use crate::session::Session;

/// Context shared by every round of a session.
#[derive(Debug, Clone, Default)]
pub struct SharedInputs {
    pub web_digest: Option<Arc<str>>,
    pub file_context: Option<Arc<str>>,
}

/// Drives rounds `1..=total_rounds`. The only writer of the session's turn
/// list.
pub struct RoundScheduler {
    generator: Arc<dyn GenerationService>,
    sink: EventSink,
    cancel: CancellationToken,
    limits: TurnLimits,
}

impl RoundScheduler {
    pub fn new(
        generator: Arc<dyn GenerationService>,
        sink: EventSink,
        cancel: CancellationToken,
        limits: TurnLimits,
    ) -> Self {
        Self {
            generator,
            sink,
            cancel,
            limits,
        }
    }

    /// Run every remaining round.
    pub async fn run_all(
        &self,
        session: &mut Session,
        shared: &SharedInputs,
    ) -> DeliberationResult<()> {
        while session.has_rounds_remaining() {
            let round = session.current_round + 1;
            self.run_round(session, round, shared).await?;
        }
        Ok(())
    }

    /// Run one round: freeze the context, fan out one turn per participant,
    /// wait for all of them, then record the turns in completion order.
    pub async fn run_round(
        &self,
        session: &mut Session,
        round: u32,
        shared: &SharedInputs,
    ) -> DeliberationResult<()> {
        if self.cancel.is_cancelled() {
            return Err(DeliberationError::Cancelled);
        }
        session
            .begin_round(round)
            .map_err(|e| DeliberationError::Internal(e.into()))?;

        self.sink.emit(ProgressEvent::RoundStart {
            round,
            total_rounds: session.total_rounds,
        });
        info!(
            session_id = %session.id,
            round,
            total_rounds = session.total_rounds,
            participants = session.participants().len(),
            "Round started"
        );

        let context = Arc::new(RoundContext {
            question: Arc::from(session.question.as_str()),
            round,
            total_rounds: session.total_rounds,
            snapshot: Arc::new(session.snapshot()),
            web_digest: shared.web_digest.clone(),
            file_context: shared.file_context.clone(),
            limits: self.limits,
        });

        let mut barrier = RoundBarrier::new();
        for participant in session.participants() {
            let task = TurnTask::new(Arc::new(participant.clone()), context.clone());
            barrier.spawn(task.run(self.generator.clone(), self.sink.clone()));
        }

        let turns = barrier.wait_all(&self.cancel).await?;
        let stances = turns.iter().filter(|t| t.stance.is_some()).count();
        session
            .record_round(turns)
            .map_err(|e| DeliberationError::Internal(e.into()))?;

        info!(
            session_id = %session.id,
            round,
            stances,
            turns = session.turns().len(),
            "Round complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::StreamExt;

    use super::*;
    use crate::errors::GenerationError;
    use crate::events::drain;
    use crate::generation::{ObjectRequest, TextRequest, TokenStream};
    use crate::session::{Participant, SessionPhase};

    #[derive(Default)]
    struct Recorder {
        prompts: Mutex<Vec<String>>,
        /// `(system, prompt)` per call.
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl GenerationService for Recorder {
        async fn stream_text(&self, request: TextRequest) -> Result<TokenStream, GenerationError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            self.calls
                .lock()
                .unwrap()
                .push((request.system, request.prompt));
            let tokens = vec![Ok("[STANCE: 3] ".to_string()), Ok("Noted.".to_string())];
            Ok(futures::stream::iter(tokens).boxed())
        }

        async fn generate_object(
            &self,
            _request: ObjectRequest,
        ) -> Result<serde_json::Value, GenerationError> {
            Err(GenerationError::Request("not scripted".into()))
        }
    }

    fn seated(rounds: u32) -> Session {
        let participant = |id: &str, name: &str| Participant {
            id: id.into(),
            name: name.into(),
            role: "a panelist".into(),
            perspective: String::new(),
            voice_id: None,
        };
        let mut session = Session::new("Should we?", rounds);
        session.transition(SessionPhase::SeatingPanel, "test").unwrap();
        session
            .seat_panel(vec![participant("ada", "Ada"), participant("bo", "Bo")])
            .unwrap();
        session.transition(SessionPhase::Deliberating, "test").unwrap();
        session
    }

    #[tokio::test]
    async fn rounds_run_in_order_against_frozen_context() {
        let generator = Arc::new(Recorder::default());
        let (sink, mut rx) = EventSink::channel("s1");
        let scheduler = RoundScheduler::new(
            generator.clone(),
            sink,
            CancellationToken::new(),
            TurnLimits::default(),
        );
        let mut session = seated(2);

        scheduler
            .run_all(&mut session, &SharedInputs::default())
            .await
            .unwrap();

        assert_eq!(session.turns().len(), 4);
        assert!(!session.has_rounds_remaining());

        let rounds: Vec<u32> = drain(&mut rx)
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::RoundStart { round, .. } => Some(*round),
                _ => None,
            })
            .collect();
        assert_eq!(rounds, [1, 2]);

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 4);
        assert!(prompts[..2].iter().all(|p| !p.contains("just said")));
        assert!(prompts[2..].iter().all(|p| p.contains("just said: \"Noted.\"")));
    }

    #[tokio::test]
    async fn cancelled_scheduler_starts_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (sink, mut rx) = EventSink::channel("s1");
        let scheduler = RoundScheduler::new(
            Arc::new(Recorder::default()),
            sink,
            cancel,
            TurnLimits::default(),
        );
        let mut session = seated(3);

        let err = scheduler
            .run_all(&mut session, &SharedInputs::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliberationError::Cancelled));
        assert!(drain(&mut rx).is_empty());
        assert!(session.turns().is_empty());
    }

    #[tokio::test]
    async fn nobody_is_asked_to_answer_their_own_turn() {
        let generator = Arc::new(Recorder::default());
        let (sink, _rx) = EventSink::channel("s1");
        let scheduler = RoundScheduler::new(
            generator.clone(),
            sink,
            CancellationToken::new(),
            TurnLimits::default(),
        );
        let mut session = seated(3);

        scheduler
            .run_all(&mut session, &SharedInputs::default())
            .await
            .unwrap();

        let calls = generator.calls.lock().unwrap();
        let later: Vec<_> = calls
            .iter()
            .filter(|(_, prompt)| !prompt.contains("Round 1 of"))
            .collect();
        assert_eq!(later.len(), 4);
        for (system, prompt) in later {
            let speaker = if system.starts_with("You are Ada,") { "Ada" } else { "Bo" };
            let other = if speaker == "Ada" { "Bo" } else { "Ada" };
            assert!(
                prompt.contains(&format!("{other} just said:")),
                "{speaker} should answer {other}: {prompt}"
            );
            assert!(!prompt.contains(&format!("{speaker} just said:")));
        }
    }
}
