//! Panel deliberation server and CLI.
//!
//! # Usage
//!
//! ```bash
//! # Serve the SSE endpoint
//! OPENAI_API_KEY=... deliberation-server serve --bind 0.0.0.0:3000
//!
//! # Run one session in-process and print the transcript
//! deliberation-server ask "Should cities ban cars downtown?" \
//!     --participant "Urbanist: favours dense transit" --rounds 2
//!
//! # Seat a ready-made panel instead of synthesizing one
//! deliberation-server ask "Is the statute constitutional?" --preset supreme-court
//!
//! # Same, against a running server
//! deliberation-server ask "Should cities ban cars downtown?" --server http://127.0.0.1:3000
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use deliberation::events::validate;
use deliberation::{
    ClientOutcome, ClientSession, DeliberationConfig, DeliberationEngine, DeliberationRequest,
    ParticipantSpec, Preset, RemoteClient, SessionView, ViewStatus,
};
use deliberation_server::{create_router, AppState};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; environment defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP endpoint
    Serve {
        /// Address to bind (overrides `bind_addr`)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one deliberation and print the result
    Ask {
        question: String,

        /// Panel member as "Name: description"; repeatable
        #[arg(long = "participant", short = 'p')]
        participants: Vec<String>,

        /// Ready-made panel (e.g. `supreme-court`); explicit participants win
        #[arg(long)]
        preset: Option<Preset>,

        #[arg(long)]
        rounds: Option<u32>,

        /// Text file handed to the panel as reference material
        #[arg(long)]
        file: Option<PathBuf>,

        /// Base URL of a running server; runs in-process when omitted
        #[arg(long)]
        server: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = DeliberationConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    match args.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Ask {
            question,
            participants,
            preset,
            rounds,
            file,
            server,
        } => {
            let request =
                build_request(question, &participants, preset, rounds, file.as_deref())?;
            ask(config, request, server).await
        }
    }
}

async fn serve(config: DeliberationConfig, bind: Option<String>) -> Result<()> {
    let addr = bind.unwrap_or_else(|| config.bind_addr.clone());
    info!(
        model = %config.generation.model,
        rounds = config.total_rounds,
        lookup = config.lookup.is_enabled(),
        "Deliberation server starting"
    );

    let app = create_router(AppState::from_config(config));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_request(
    question: String,
    participants: &[String],
    preset: Option<Preset>,
    rounds: Option<u32>,
    file: Option<&std::path::Path>,
) -> Result<DeliberationRequest> {
    let mut request = DeliberationRequest::new(question);
    if !participants.is_empty() {
        let specs = participants
            .iter()
            .map(|raw| {
                ParticipantSpec::parse_shorthand(raw)
                    .with_context(|| format!("Invalid participant {raw:?}"))
            })
            .collect::<Result<Vec<_>>>()?;
        request = request.with_participants(specs);
    }
    if let Some(preset) = preset {
        request = request.with_preset(preset);
    }
    if let Some(rounds) = rounds {
        request = request.with_rounds(rounds);
    }
    if let Some(path) = file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        request = request.with_file_context(text);
    }
    Ok(request)
}

async fn ask(
    config: DeliberationConfig,
    request: DeliberationRequest,
    server: Option<String>,
) -> Result<()> {
    let (session, observer) = ClientSession::new(&request.question);
    println!("Q: {}\n", request.question);
    let printer = tokio::spawn(print_live(observer));

    let outcome = match server {
        Some(url) => RemoteClient::new(url).run(&request, session).await?,
        None => {
            let engine = DeliberationEngine::from_config(config);
            let handle = engine.start(request)?;
            session.consume_receiver(handle.events).await
        }
    };

    if let Err(e) = printer.await {
        warn!(error = %e, "Transcript printer stopped");
    }
    if let Err(e) = validate(&outcome.events) {
        warn!(error = %e, "Event log broke an ordering rule");
    }
    print_outcome(&outcome);

    if outcome.view.status == ViewStatus::Error {
        bail!(
            "{}",
            outcome.view.error.as_deref().unwrap_or("Session failed")
        );
    }
    Ok(())
}

/// Print each turn once it is finalized. Ends when the session is dropped.
async fn print_live(mut observer: watch::Receiver<SessionView>) {
    let mut printed = HashSet::new();
    let mut round = 0;
    while observer.changed().await.is_ok() {
        let view = observer.borrow_and_update().clone();
        for turn in view.turns.iter().filter(|t| t.finalized) {
            if !printed.insert(turn.turn_id.clone()) {
                continue;
            }
            if turn.round != round {
                round = turn.round;
                println!("── Round {round} of {} ──", view.total_rounds);
            }
            let name = view
                .participant_name(&turn.participant_id)
                .unwrap_or(&turn.participant_id);
            let stance = turn
                .stance
                .map(|s| format!(" [{}/6 {}]", s.value(), s.label()))
                .unwrap_or_default();
            println!("{name}{stance}: {}", turn.display_text);
        }
    }
}

fn print_outcome(outcome: &ClientOutcome) {
    let view = &outcome.view;

    if !view.summary.is_empty() {
        println!("\n── Synthesis ──\n{}", view.summary.trim());
    }

    if let Some(verdict) = &view.verdict {
        println!(
            "\n── Verdict: {} ({} for, {} against of {}) · confidence {:.0}% ──",
            verdict.outcome, verdict.for_count, verdict.against_count, verdict.total_voters,
            verdict.confidence
        );
        println!("{}", verdict.decision);
        for argument in &verdict.key_arguments {
            let name = view
                .participant_name(&argument.participant_id)
                .unwrap_or(&argument.participant_id);
            println!("  • {name}: {}", argument.argument);
        }
    }

    if outcome.dropped > 0 {
        warn!(dropped = outcome.dropped, "Malformed events were skipped");
    }
}
