//! Session data model: participants, turns and the server-side session.
//!
//! # Lifecycle
//!
//! ```text
//! Created → SeatingPanel → [LookingUp] → Deliberating → Summarizing → Deciding → Completed
//!    │           │              │             │              │            │
//!    └───────────┴──────────────┴─────────────┴──────────────┴────────────┴──→ Failed
//! ```

pub mod participant;
pub mod state;
pub mod turn;

pub use participant::{normalize_name, Participant, ParticipantSpec};
pub use state::{PhaseTransition, Session, SessionError, SessionPhase};
pub use turn::{AlreadyFinalized, ContextSnapshot, Turn, TurnExcerpt};
