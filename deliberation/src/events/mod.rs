//! Session progress events.
//!
//! # Architecture
//!
//! 1. **Event Types** (`types.rs`): the tagged `ProgressEvent` enum that is
//!    serialized onto the wire, one JSON object per SSE message.
//!
//! 2. **Event Sink** (`sink.rs`): the ordered one-way channel a session emits
//!    into. Shared by the scheduler and every concurrent turn task.
//!
//! 3. **Protocol** (`protocol.rs`): ordering rules for a captured log.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  TurnTasks   │────▶│  EventSink   │────▶│  Transport   │
//! │  Scheduler   │     │   (mpsc)     │     │  (SSE/recv)  │
//! └──────────────┘     └──────────────┘     └──────┬───────┘
//!                                                  │
//!                                                  ▼
//!                                           ┌──────────────┐
//!                                           │ SessionView  │
//!                                           │  (reducer)   │
//!                                           └──────────────┘
//! ```

pub mod protocol;
pub mod sink;
pub mod types;

pub use protocol::validate;
pub use sink::{drain, EventReceiver, EventSink};
pub use types::{KeyArgument, ProgressEvent};
