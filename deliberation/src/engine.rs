//! Session driver.
//!
//! ```text
//! start ─▶ seat panel ─▶ [web lookup] ─▶ rounds 1..R ─▶ summary ─▶ tally ─▶ verdict ─▶ done
//!              │               │               │             │                 │
//!              └───────────────┴───────────────┴─────────────┴─────────────────┴──▶ session_error
//! ```
//!
//! A session is one spawned task writing into one [`EventSink`]. Every
//! failure ends it with exactly one `session_error`; a lookup failure is the
//! only error that does not.

use std::sync::Arc;

use futures::StreamExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{DeliberationConfig, MAX_ROUNDS};
use crate::errors::{DeliberationError, DeliberationResult};
use crate::events::{EventReceiver, EventSink, KeyArgument, ProgressEvent};
use crate::generation::{generate_structured, GenerationService, OpenAiCompatClient, TextRequest};
use crate::lookup::{CachedLookup, TavilyLookup, WebLookup};
use crate::personas::synthesize_panel;
use crate::presets::Preset;
use crate::prompts::{summary_prompt, verdict_prompt};
use crate::scheduler::{cancellable, RoundScheduler, SharedInputs, TurnLimits};
use crate::session::{ParticipantSpec, Session, SessionPhase};
use crate::tally::VoteTally;
use crate::voices::VoicePool;

const SUMMARY_TEMPERATURE: f32 = 0.7;
const VERDICT_TEMPERATURE: f32 = 0.3;

/// A request to run one deliberation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliberationRequest {
    /// Missing and blank questions are both rejected by `validate`.
    #[serde(default)]
    pub question: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<ParticipantSpec>,
    /// Pre-extracted document text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_context: Option<String>,
    /// Overrides the configured round count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounds: Option<u32>,
    /// Ready-made panel used when `participants` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
}

impl DeliberationRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            participants: Vec::new(),
            file_context: None,
            rounds: None,
            preset: None,
        }
    }

    pub fn with_participants(mut self, participants: Vec<ParticipantSpec>) -> Self {
        self.participants = participants;
        self
    }

    pub fn with_file_context(mut self, text: impl Into<String>) -> Self {
        self.file_context = Some(text.into());
        self
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = Some(rounds);
        self
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = Some(preset);
        self
    }

    /// Specs the panel is built from: explicit participants, else the
    /// preset's, else none.
    pub fn panel_specs(&self) -> Vec<ParticipantSpec> {
        match self.preset {
            Some(preset) if self.participants.is_empty() => preset.participants(),
            _ => self.participants.clone(),
        }
    }

    /// Reject requests that must not start a session.
    pub fn validate(&self) -> DeliberationResult<()> {
        if self.question.trim().is_empty() {
            return Err(DeliberationError::Validation(
                "question is required".to_string(),
            ));
        }
        if let Some(rounds) = self.rounds {
            if rounds == 0 || rounds > MAX_ROUNDS {
                return Err(DeliberationError::Validation(format!(
                    "rounds must be between 1 and {MAX_ROUNDS}"
                )));
            }
        }
        if self.participants.iter().any(|p| p.name.trim().is_empty()) {
            return Err(DeliberationError::Validation(
                "participant names must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Structured verdict as generated, before clamping.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct VerdictDraft {
    /// Two or three sentences stating the verdict; must agree with the tally.
    decision: String,
    /// 0 to 100, within the band given with the tally.
    confidence: f64,
    #[serde(default)]
    key_arguments: Vec<KeyArgument>,
}

/// Published verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: String,
    pub confidence: f64,
    pub key_arguments: Vec<KeyArgument>,
    pub tally: VoteTally,
}

/// A running session.
pub struct SessionHandle {
    pub session_id: String,
    pub events: EventReceiver,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Split into the event receiver and the session's cancel token. The
    /// session keeps running detached.
    pub fn into_parts(self) -> (EventReceiver, CancellationToken) {
        (self.events, self.cancel)
    }

    /// Wait for the session to finish and return every event it emitted.
    pub async fn collect(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        if let Err(e) = self.task.await {
            error!(session_id = %self.session_id, error = %e, "Session task panicked");
        }
        events
    }
}

/// Runs deliberation sessions.
#[derive(Clone)]
pub struct DeliberationEngine {
    config: Arc<DeliberationConfig>,
    generator: Arc<dyn GenerationService>,
    lookup: Option<Arc<dyn WebLookup>>,
    voices: VoicePool,
}

impl DeliberationEngine {
    pub fn new(config: DeliberationConfig, generator: Arc<dyn GenerationService>) -> Self {
        let voices = config.voice_pool();
        Self {
            config: Arc::new(config),
            generator,
            lookup: None,
            voices,
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn WebLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Wire the production services described by `config`.
    pub fn from_config(config: DeliberationConfig) -> Self {
        let generator = Arc::new(OpenAiCompatClient::new(
            config.generation.api_key.clone(),
            config.generation.base_url.clone(),
            config.generation.model.clone(),
        ));
        let lookup = config.lookup.api_key.clone().map(|key| {
            let tavily: Arc<dyn WebLookup> =
                Arc::new(TavilyLookup::new(key, config.lookup.max_results));
            Arc::new(CachedLookup::with_capacity(
                tavily,
                config.lookup.cache_capacity,
                config.lookup.cache_ttl(),
            )) as Arc<dyn WebLookup>
        });

        let engine = Self::new(config, generator);
        match lookup {
            Some(lookup) => engine.with_lookup(lookup),
            None => engine,
        }
    }

    pub fn config(&self) -> &DeliberationConfig {
        &self.config
    }

    /// Validate the request and spawn the session.
    ///
    /// Validation failures are returned here and no event is ever emitted.
    pub fn start(&self, request: DeliberationRequest) -> DeliberationResult<SessionHandle> {
        request.validate()?;
        let rounds = request.rounds.unwrap_or(self.config.total_rounds);
        let session = Session::new(request.question.trim(), rounds);
        let session_id = session.id.clone();
        let (sink, events) = EventSink::channel(&session_id);
        let cancel = CancellationToken::new();

        let engine = self.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            engine.drive(session, request, sink, task_cancel).await;
        });

        Ok(SessionHandle {
            session_id,
            events,
            cancel,
            task,
        })
    }

    async fn drive(
        &self,
        mut session: Session,
        request: DeliberationRequest,
        sink: EventSink,
        cancel: CancellationToken,
    ) {
        info!(session_id = %session.id, question = %session.question, rounds = session.total_rounds, "Session started");
        match self.run(&mut session, &request, &sink, &cancel).await {
            Ok(verdict) => {
                info!(
                    session_id = %session.id,
                    outcome = %verdict.tally.outcome(),
                    confidence = verdict.confidence,
                    "Session completed"
                );
                sink.finish();
            }
            Err(e) => {
                if !session.phase.is_terminal() {
                    let _ = session.transition(SessionPhase::Failed, &e.to_string());
                }
                match e.category() {
                    crate::errors::ErrorCategory::Cancelled => {
                        info!(session_id = %session.id, "Session cancelled")
                    }
                    category => {
                        error!(session_id = %session.id, %category, error = %e, "Session failed")
                    }
                }
                sink.fail(e.user_message());
            }
        }
    }

    fn advance(session: &mut Session, to: SessionPhase, reason: &str) -> DeliberationResult<()> {
        session
            .transition(to, reason)
            .map_err(|e| DeliberationError::Internal(e.into()))
    }

    /// Run a session to its verdict. Emits every event except the terminal
    /// one.
    pub async fn run(
        &self,
        session: &mut Session,
        request: &DeliberationRequest,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> DeliberationResult<Verdict> {
        // Panel
        Self::advance(session, SessionPhase::SeatingPanel, "request accepted")?;
        let specs = request.panel_specs();
        let panel = cancellable(
            cancel,
            synthesize_panel(
                self.generator.as_ref(),
                &session.question,
                &specs,
                &self.voices,
            ),
        )
        .await?;
        session
            .seat_panel(panel)
            .map_err(|e| DeliberationError::Internal(e.into()))?;
        sink.emit(ProgressEvent::ParticipantsReady {
            participants: session.participants().to_vec(),
        });

        // Shared lookup
        let mut shared = SharedInputs {
            web_digest: None,
            file_context: request
                .file_context
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .map(Arc::from),
        };
        if let Some(lookup) = &self.lookup {
            Self::advance(session, SessionPhase::LookingUp, "lookup configured")?;
            sink.emit(ProgressEvent::LookupStart {
                query: session.question.clone(),
            });
            let outcome = cancellable(cancel, async {
                Ok::<_, DeliberationError>(lookup.digest(&session.question).await)
            })
            .await?;
            let digest = match outcome {
                Ok(digest) if !digest.trim().is_empty() => Some(digest),
                Ok(_) => None,
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "Web lookup failed, continuing without it");
                    None
                }
            };
            sink.emit(ProgressEvent::LookupDone {
                found: digest.is_some(),
            });
            shared.web_digest = digest.map(Arc::from);
        }

        // Rounds
        Self::advance(session, SessionPhase::Deliberating, "panel seated")?;
        let scheduler = RoundScheduler::new(
            self.generator.clone(),
            sink.clone(),
            cancel.clone(),
            TurnLimits {
                max_tokens: self.config.turn_max_tokens,
                temperature: self.config.turn_temperature,
            },
        );
        scheduler.run_all(session, &shared).await?;

        // Summary
        Self::advance(session, SessionPhase::Summarizing, "rounds complete")?;
        let summary = cancellable(cancel, self.stream_summary(session, request, sink)).await?;

        // Tally and verdict
        let tally = VoteTally::compute(session.turns(), session.participants());
        info!(
            session_id = %session.id,
            for_count = tally.for_count,
            against_count = tally.against_count,
            total_voters = tally.total_voters,
            outcome = %tally.outcome(),
            "Tally computed"
        );
        Self::advance(session, SessionPhase::Deciding, "summary complete")?;
        let verdict = cancellable(cancel, self.decide(session, &summary, tally)).await?;

        sink.emit(ProgressEvent::DecisionReady {
            decision: verdict.decision.clone(),
            confidence: verdict.confidence,
            key_arguments: verdict.key_arguments.clone(),
            outcome: verdict.tally.outcome(),
            for_count: verdict.tally.for_count,
            against_count: verdict.tally.against_count,
            total_voters: verdict.tally.total_voters,
        });
        Self::advance(session, SessionPhase::Completed, "verdict published")?;
        Ok(verdict)
    }

    async fn stream_summary(
        &self,
        session: &Session,
        request: &DeliberationRequest,
        sink: &EventSink,
    ) -> DeliberationResult<String> {
        let (system, prompt) = summary_prompt(
            &session.question,
            &session.transcript(),
            request.file_context.as_deref(),
        );
        let mut tokens = self
            .generator
            .stream_text(TextRequest {
                system,
                prompt,
                max_tokens: self.config.summary_max_tokens,
                temperature: SUMMARY_TEMPERATURE,
            })
            .await
            .map_err(|e| DeliberationError::generation("summary", e))?;

        let mut summary = String::new();
        while let Some(token) = tokens.next().await {
            let token = token.map_err(|e| DeliberationError::generation("summary", e))?;
            if token.is_empty() {
                continue;
            }
            summary.push_str(&token);
            sink.emit(ProgressEvent::SummaryToken { token });
        }
        sink.emit(ProgressEvent::SummaryDone);
        Ok(summary)
    }

    async fn decide(
        &self,
        session: &Session,
        summary: &str,
        tally: VoteTally,
    ) -> DeliberationResult<Verdict> {
        let constraint = tally.constraint();
        let (system, prompt) = verdict_prompt(&session.question, summary, &constraint);
        let draft: VerdictDraft = generate_structured(
            self.generator.as_ref(),
            &system,
            &prompt,
            self.config.verdict_max_tokens,
            VERDICT_TEMPERATURE,
        )
        .await
        .map_err(|e| DeliberationError::generation("verdict", e))?;

        let confidence = constraint.confidence_band.clamp(draft.confidence);
        if confidence != draft.confidence {
            warn!(
                session_id = %session.id,
                generated = draft.confidence,
                clamped = confidence,
                "Verdict confidence outside the tally's band"
            );
        }

        let mut seen = std::collections::HashSet::new();
        let key_arguments = draft
            .key_arguments
            .into_iter()
            .filter(|a| session.participant(&a.participant_id).is_some())
            .filter(|a| seen.insert(a.participant_id.clone()))
            .collect();

        Ok(Verdict {
            decision: draft.decision,
            confidence,
            key_arguments,
            tally,
        })
    }
}
