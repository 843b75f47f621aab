//! Panel Deliberation Engine
//!
//! Runs a timed, multi-participant deliberation over a posed question: a panel
//! of participants gives short position statements across several rounds, a
//! synthesis is streamed, and the verdict is bound to the panel's declared
//! stances rather than re-invented by the generator.
//!
//! # Components
//!
//! - [`stance`]: directive and emotion-cue extraction from raw turn text
//! - [`scheduler`]: sequential rounds of concurrent turns behind an
//!   all-or-nothing barrier
//! - [`tally`]: the deterministic vote tally and the verdict constraint
//! - [`events`]: the ordered progress event stream and its ordering rules
//! - [`reducer`] and [`client`]: client-side state reconstruction
//! - [`engine`]: wires a session end to end
//!
//! # Usage
//!
//! ```ignore
//! use deliberation::{DeliberationConfig, DeliberationEngine, DeliberationRequest};
//! use deliberation::client::ClientSession;
//!
//! let engine = DeliberationEngine::from_config(DeliberationConfig::load(None)?);
//! let handle = engine.start(DeliberationRequest::new("Should cities ban cars?"))?;
//!
//! let (session, mut observer) = ClientSession::new("Should cities ban cars?");
//! let outcome = session.consume_receiver(handle.events).await;
//! println!("{:?}", outcome.view.verdict);
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod generation;
pub mod lookup;
pub mod personas;
pub mod presets;
pub mod prompts;
pub mod reducer;
pub mod scheduler;
pub mod session;
pub mod stance;
pub mod tally;
pub mod voices;

pub use client::{ClientOutcome, ClientSession, RemoteClient};
pub use config::DeliberationConfig;
pub use engine::{DeliberationEngine, DeliberationRequest, SessionHandle, Verdict};
pub use errors::{DeliberationError, DeliberationResult, ErrorCategory};
pub use events::{EventSink, KeyArgument, ProgressEvent};
pub use generation::{GenerationService, TextRequest, ObjectRequest, TokenStream};
pub use lookup::WebLookup;
pub use presets::Preset;
pub use reducer::{SessionView, ViewStatus};
pub use session::{Participant, ParticipantSpec, Session, Turn};
pub use stance::{ParsedStance, Stance};
pub use tally::{TallyOutcome, VoteTally};
