//! Round scheduling.
//!
//! ```text
//! round r:  RoundStart ─▶ snapshot ─▶ TurnTask × N (concurrent) ─▶ barrier ─▶ record
//!                                          │
//!                                          └── tokens stream straight to the sink
//! ```
//!
//! Rounds run strictly one after another. Inside a round every participant
//! speaks against the same frozen snapshot.

pub mod barrier;
pub mod rounds;
pub mod turn;

pub use barrier::{cancellable, RoundBarrier};
pub use rounds::{RoundScheduler, SharedInputs};
pub use turn::{RoundContext, TurnLimits, TurnTask};
