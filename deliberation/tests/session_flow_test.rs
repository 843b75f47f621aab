//! End-to-end sessions against a scripted generator (no network).
//!
//! Covers: engine ↔ scheduler ↔ barrier ↔ sink ↔ protocol ↔ reducer running
//! together.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{config, FailingLookup, FixedLookup, ScriptedGenerator, TRIO};
use deliberation::client::ClientSession;
use deliberation::events::{self, validate, EventSink, ProgressEvent};
use deliberation::reducer::{replay, ViewStatus};
use deliberation::session::{ParticipantSpec, Session};
use deliberation::{
    DeliberationEngine, DeliberationError, DeliberationRequest, Preset, TallyOutcome,
};

fn engine(generator: ScriptedGenerator, rounds: u32) -> DeliberationEngine {
    DeliberationEngine::new(config(rounds), Arc::new(generator))
}

fn count(events: &[ProgressEvent], event_type: &str) -> usize {
    events.iter().filter(|e| e.event_type() == event_type).count()
}

// ── Happy path ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_session_produces_n_by_r_turns() {
    let engine = engine(ScriptedGenerator::constant(TRIO, 5), 3);
    let handle = engine.start(DeliberationRequest::new("Should we?")).unwrap();
    let events = handle.collect().await;

    validate(&events).unwrap();
    assert_eq!(events.last(), Some(&ProgressEvent::SessionDone));
    assert_eq!(count(&events, "session_done"), 1);
    assert_eq!(count(&events, "session_error"), 0);
    assert_eq!(count(&events, "round_start"), 3);
    assert_eq!(count(&events, "turn_done"), 9);

    let turn_ids: HashSet<&str> = events.iter().filter_map(|e| e.turn_id()).collect();
    assert_eq!(turn_ids.len(), 9);

    for event in &events {
        if let ProgressEvent::TurnStart { round, voice_id, .. } = event {
            assert!((1..=3).contains(round));
            assert!(voice_id.is_some());
        }
    }

    let order: Vec<&str> = events
        .iter()
        .map(|e| e.event_type())
        .filter(|t| !t.starts_with("turn_") && *t != "summary_token")
        .collect();
    assert_eq!(
        order,
        [
            "participants_ready",
            "round_start",
            "round_start",
            "round_start",
            "summary_done",
            "decision_ready",
            "session_done"
        ]
    );
}

#[tokio::test]
async fn test_unanimous_panel_scenario() {
    // 3 participants, 3 rounds, every final stance 5.
    let engine = engine(
        ScriptedGenerator::constant(TRIO, 5).with_verdict_confidence(99.0),
        3,
    );
    let request = DeliberationRequest::new("Should we?");
    let mut session = Session::new(&request.question, 3);
    let (sink, mut rx) = EventSink::channel(&session.id);

    let verdict = engine
        .run(&mut session, &request, &sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(verdict.tally.for_count, 3);
    assert_eq!(verdict.tally.against_count, 0);
    assert!((verdict.tally.average_stance - 5.0).abs() < 1e-9);
    assert_eq!(verdict.tally.outcome(), TallyOutcome::For);
    assert_eq!(verdict.tally.outcome().label(), "FOR");
    // generated 99, unanimous band tops out at 98
    assert_eq!(verdict.confidence, 98.0);
    assert_eq!(verdict.key_arguments.len(), 3);
    assert_eq!(session.turns().len(), 9);

    let emitted = events::drain(&mut rx);
    let decision = emitted
        .iter()
        .find_map(|e| match e {
            ProgressEvent::DecisionReady {
                outcome,
                for_count,
                against_count,
                total_voters,
                confidence,
                ..
            } => Some((*outcome, *for_count, *against_count, *total_voters, *confidence)),
            _ => None,
        })
        .unwrap();
    assert_eq!(decision, (TallyOutcome::For, 3, 0, 3, 98.0));
    // `run` leaves the terminal event to the caller
    assert!(!emitted.iter().any(ProgressEvent::is_terminal));
}

#[tokio::test]
async fn test_final_round_stance_wins() {
    // Everyone starts against and ends for.
    let script: common::Script = Arc::new(|name: &str, round: u32| {
        let stance = if round < 2 { 2 } else { 6 };
        format!("[STANCE: {stance}] {name} speaks.")
    });
    let engine = engine(ScriptedGenerator::new(TRIO, script), 2);
    let events = engine
        .start(DeliberationRequest::new("Q?"))
        .unwrap()
        .collect()
        .await;

    let view = replay("Q?", &events);
    let verdict = view.verdict.unwrap();
    assert_eq!(verdict.outcome, TallyOutcome::For);
    assert_eq!((verdict.for_count, verdict.against_count), (3, 0));
}

// ── Failure paths ──────────────────────────────────────────────────

#[tokio::test]
async fn test_failure_in_round_two_aborts_session() {
    let generator = ScriptedGenerator::constant(TRIO, 4).failing_at(2, "Bo");
    let engine = engine(generator, 3);
    let events = engine
        .start(DeliberationRequest::new("Should we?"))
        .unwrap()
        .collect()
        .await;

    validate(&events).unwrap();
    assert_eq!(count(&events, "session_error"), 1);
    assert!(events.last().is_some_and(ProgressEvent::is_terminal));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ProgressEvent::RoundStart { round: 3, .. })));
    assert_eq!(count(&events, "summary_done"), 0);
    assert_eq!(count(&events, "decision_ready"), 0);

    let view = replay("Should we?", &events);
    assert_eq!(view.status, ViewStatus::Error);
    let message = view.error.unwrap();
    assert!(message.contains("round 2"), "{message}");
    assert!(message.contains("connection reset"), "{message}");
}

#[tokio::test]
async fn test_empty_question_is_rejected_before_any_event() {
    let engine = engine(ScriptedGenerator::constant(TRIO, 4), 3);
    let err = engine.start(DeliberationRequest::new("   ")).err().unwrap();
    assert!(matches!(err, DeliberationError::Validation(_)));
}

#[tokio::test]
async fn test_lookup_failure_is_swallowed() {
    let engine = engine(ScriptedGenerator::constant(TRIO, 2), 1).with_lookup(Arc::new(FailingLookup));
    let events = engine
        .start(DeliberationRequest::new("Q?"))
        .unwrap()
        .collect()
        .await;

    validate(&events).unwrap();
    assert!(events.contains(&ProgressEvent::LookupDone { found: false }));
    assert_eq!(events.last(), Some(&ProgressEvent::SessionDone));
}

#[tokio::test]
async fn test_lookup_digest_is_announced() {
    let engine =
        engine(ScriptedGenerator::constant(TRIO, 2), 1).with_lookup(Arc::new(FixedLookup("facts")));
    let events = engine
        .start(DeliberationRequest::new("Q?"))
        .unwrap()
        .collect()
        .await;

    let lookup_start = events
        .iter()
        .position(|e| matches!(e, ProgressEvent::LookupStart { .. }))
        .unwrap();
    let first_round = events
        .iter()
        .position(|e| matches!(e, ProgressEvent::RoundStart { .. }))
        .unwrap();
    assert!(lookup_start < first_round);
    assert!(events.contains(&ProgressEvent::LookupDone { found: true }));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_ends_with_one_error() {
    let generator =
        ScriptedGenerator::constant(TRIO, 4).with_token_delay(Duration::from_secs(1));
    let engine = engine(generator, 3);
    let handle = engine.start(DeliberationRequest::new("Q?")).unwrap();

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        cancel.cancel();
    });
    let events = handle.collect().await;

    validate(&events).unwrap();
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::SessionError {
            message: "Session cancelled".into()
        })
    );
    assert_eq!(count(&events, "round_start"), 1);
}

// ── Panel specs ────────────────────────────────────────────────────

#[tokio::test]
async fn test_specs_keep_names_and_voices() {
    let engine = engine(ScriptedGenerator::constant(TRIO, 4), 1);
    let request = DeliberationRequest::new("Q?").with_participants(vec![
        ParticipantSpec::new("Ada", "first"),
        ParticipantSpec::new("Bo", "second").with_voice("custom-voice"),
        ParticipantSpec::new("Cy", "third"),
    ]);
    let events = engine.start(request).unwrap().collect().await;

    let ProgressEvent::ParticipantsReady { participants } = &events[0] else {
        panic!("first event should seat the panel, got {:?}", events[0]);
    };
    let names: Vec<&str> = participants.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Ada", "Bo", "Cy"]);
    assert_eq!(participants[1].voice_id.as_deref(), Some("custom-voice"));
    assert_eq!(events.last(), Some(&ProgressEvent::SessionDone));
}

#[tokio::test]
async fn test_supreme_court_preset_seats_the_bench() {
    let engine = engine(ScriptedGenerator::constant(TRIO, 4), 1);
    let request = DeliberationRequest::new("Is the statute constitutional?")
        .with_preset(Preset::SupremeCourt);
    let events = engine.start(request).unwrap().collect().await;

    let ProgressEvent::ParticipantsReady { participants } = &events[0] else {
        panic!("first event should seat the panel, got {:?}", events[0]);
    };
    let expected = Preset::SupremeCourt.participants();
    assert_eq!(participants.len(), 9);
    for (seated, spec) in participants.iter().zip(&expected) {
        assert_eq!(seated.name, spec.name);
        assert_eq!(seated.voice_id, spec.voice_id);
    }
    assert_eq!(participants[0].name, "John Roberts");
    assert_eq!(count(&events, "turn_done"), 9);
    validate(&events).unwrap();
}

// ── Client read loop ───────────────────────────────────────────────

#[tokio::test]
async fn test_client_session_follows_live_stream() {
    let engine = engine(ScriptedGenerator::constant(TRIO, 3), 2);
    let handle = engine.start(DeliberationRequest::new("Q?")).unwrap();
    let (session, observer) = ClientSession::new("Q?");
    let outcome = session.consume_receiver(handle.events).await;

    assert_eq!(outcome.view.status, ViewStatus::Done);
    assert_eq!(outcome.view.turns.len(), 6);
    assert!(outcome.view.turns.iter().all(|t| t.finalized));
    assert!(outcome
        .view
        .turns
        .iter()
        .all(|t| !t.display_text.contains("STANCE") && !t.display_text.starts_with('(')));
    assert!(outcome
        .view
        .turns
        .iter()
        .all(|t| t.spoken_text.as_deref().is_some_and(|s| s.starts_with("(firmly)"))));
    assert_eq!(outcome.view.verdict.unwrap().outcome, TallyOutcome::Against);
    assert_eq!(observer.borrow().status, ViewStatus::Done);
    validate(&outcome.events).unwrap();
}
