//! Shared fixtures: a scripted generation service and a failing lookup.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use deliberation::errors::{GenerationError, LookupError};
use deliberation::generation::{GenerationService, ObjectRequest, TextRequest, TokenStream};
use deliberation::lookup::WebLookup;
use deliberation::DeliberationConfig;

/// Decides what a participant says in a round.
pub type Script = Arc<dyn Fn(&str, u32) -> String + Send + Sync>;

/// Deterministic generator: personas from a fixed roster, turns from a
/// script, a canned summary and verdict.
pub struct ScriptedGenerator {
    roster: Vec<(String, String)>,
    script: Script,
    /// `(round, participant name)` whose turn fails mid-stream.
    fail_at: Option<(u32, String)>,
    verdict_confidence: f64,
    token_delay: Option<Duration>,
    pub text_calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(roster: &[(&str, &str)], script: Script) -> Self {
        Self {
            roster: roster
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
            script,
            fail_at: None,
            verdict_confidence: 75.0,
            token_delay: None,
            text_calls: AtomicUsize::new(0),
        }
    }

    /// Every participant always declares `stance`.
    pub fn constant(roster: &[(&str, &str)], stance: u8) -> Self {
        Self::new(
            roster,
            Arc::new(move |name: &str, round: u32| {
                format!("[STANCE: {stance}] (firmly) {name} holds the line in round {round}.")
            }),
        )
    }

    pub fn failing_at(mut self, round: u32, name: &str) -> Self {
        self.fail_at = Some((round, name.to_string()));
        self
    }

    pub fn with_verdict_confidence(mut self, confidence: f64) -> Self {
        self.verdict_confidence = confidence;
        self
    }

    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }
}

fn speaker(system: &str) -> Option<&str> {
    let rest = system.strip_prefix("You are ")?;
    rest.split(',').next()
}

fn round_of(prompt: &str) -> u32 {
    prompt
        .split("\n\nRound ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn chunks(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn stream_text(&self, request: TextRequest) -> Result<TokenStream, GenerationError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.token_delay;

        let (text, fail) = match speaker(&request.system) {
            Some(name) if self.roster.iter().any(|(_, n)| n == name) => {
                let round = round_of(&request.prompt);
                let fail = self
                    .fail_at
                    .as_ref()
                    .is_some_and(|(r, n)| *r == round && n == name);
                ((self.script)(name, round), fail)
            }
            _ => ("The panel weighed the question carefully.".to_string(), false),
        };

        let mut items: Vec<Result<String, GenerationError>> =
            chunks(&text).into_iter().map(Ok).collect();
        if fail {
            items.truncate(1);
            items.push(Err(GenerationError::Stream("connection reset".into())));
        }

        Ok(futures::stream::iter(items)
            .then(move |item| async move {
                match delay {
                    Some(d) => tokio::time::sleep(d).await,
                    None => tokio::task::yield_now().await,
                }
                item
            })
            .boxed())
    }

    async fn generate_object(
        &self,
        request: ObjectRequest,
    ) -> Result<serde_json::Value, GenerationError> {
        match request.schema_name.as_str() {
            "PersonaBatch" => Ok(serde_json::json!({
                "personas": self.roster.iter().map(|(id, name)| serde_json::json!({
                    "id": id,
                    "name": name,
                    "role": format!("{name}'s role"),
                    "perspective": format!("{name} sees it their own way."),
                })).collect::<Vec<_>>()
            })),
            "VerdictDraft" => Ok(serde_json::json!({
                "decision": "The panel has spoken.",
                "confidence": self.verdict_confidence,
                "key_arguments": self.roster.iter().map(|(id, name)| serde_json::json!({
                    "participant_id": id,
                    "argument": format!("{name} made a point."),
                })).collect::<Vec<_>>()
            })),
            other => Err(GenerationError::Schema {
                schema: other.to_string(),
                message: "unexpected schema".into(),
            }),
        }
    }
}

/// Lookup that always fails.
pub struct FailingLookup;

#[async_trait]
impl WebLookup for FailingLookup {
    async fn digest(&self, _query: &str) -> Result<String, LookupError> {
        Err(LookupError::Status { status: 503 })
    }
}

/// Lookup with a fixed digest.
pub struct FixedLookup(pub &'static str);

#[async_trait]
impl WebLookup for FixedLookup {
    async fn digest(&self, _query: &str) -> Result<String, LookupError> {
        Ok(self.0.to_string())
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn config(rounds: u32) -> DeliberationConfig {
    init_tracing();
    let mut config = DeliberationConfig::from_toml_str("").expect("empty config parses");
    config.total_rounds = rounds;
    config.lookup.api_key = None;
    config
}

pub const TRIO: &[(&str, &str)] = &[("ada", "Ada"), ("bo", "Bo"), ("cy", "Cy")];
