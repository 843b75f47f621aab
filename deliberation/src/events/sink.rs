//! Ordered, one-way event sink for a single session.
//!
//! Backed by an unbounded Tokio mpsc channel: a session's event count is
//! bounded by rounds × participants × a small token ceiling, so there is no
//! backpressure. Clones share one channel, which lets concurrent turn tasks
//! emit directly while the scheduler emits round and session events.
//!
//! The terminal event takes the sender out of the sink under the same lock
//! every emit goes through, so nothing can follow `session_done` or
//! `session_error`, including a sibling task that was mid-poll when the
//! session failed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::types::ProgressEvent;

/// Receiving half handed to the transport.
pub type EventReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

struct SinkInner {
    session_id: String,
    sender: Mutex<Option<mpsc::UnboundedSender<ProgressEvent>>>,
    emitted: AtomicU64,
}

/// Cloneable handle for emitting a session's progress events.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<SinkInner>,
}

impl EventSink {
    /// Create a sink and the receiver that drains it.
    pub fn channel(session_id: &str) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let sink = Self {
            inner: Arc::new(SinkInner {
                session_id: session_id.to_string(),
                sender: Mutex::new(Some(sender)),
                emitted: AtomicU64::new(0),
            }),
        };
        (sink, receiver)
    }

    /// Emit one event. Returns `false` when the stream is already closed.
    ///
    /// A terminal event closes the stream after it is delivered.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        let event_type = event.event_type();
        let terminal = event.is_terminal();
        let mut guard = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(sender) = guard.as_ref() else {
            trace!(session_id = %self.inner.session_id, event_type, "Event dropped (stream closed)");
            return false;
        };

        if sender.send(event).is_err() {
            debug!(session_id = %self.inner.session_id, event_type, "Receiver gone, closing sink");
            *guard = None;
            return false;
        }
        self.inner.emitted.fetch_add(1, Ordering::Relaxed);

        if terminal {
            *guard = None;
            debug!(session_id = %self.inner.session_id, event_type, "Stream terminated");
        } else if event_type == "turn_token" || event_type == "summary_token" {
            trace!(session_id = %self.inner.session_id, event_type, "Event published");
        } else {
            debug!(session_id = %self.inner.session_id, event_type, "Event published");
        }
        true
    }

    /// Emit `session_done` and close.
    pub fn finish(&self) -> bool {
        self.emit(ProgressEvent::SessionDone)
    }

    /// Emit `session_error` and close.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.emit(ProgressEvent::SessionError {
            message: message.into(),
        })
    }

    /// Whether a terminal event was emitted or the receiver went away.
    pub fn is_closed(&self) -> bool {
        let guard = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.as_ref().is_none_or(|s| s.is_closed())
    }

    /// Number of events delivered so far.
    pub fn emitted(&self) -> u64 {
        self.inner.emitted.load(Ordering::Relaxed)
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("session_id", &self.inner.session_id)
            .field("emitted", &self.emitted())
            .finish()
    }
}

/// Drain everything currently buffered in a receiver.
pub fn drain(receiver: &mut EventReceiver) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel("s1");
        assert!(sink.emit(ProgressEvent::RoundStart {
            round: 1,
            total_rounds: 2
        }));
        assert!(sink.emit(ProgressEvent::SummaryDone));
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "round_start");
        assert_eq!(sink.emitted(), 2);
    }

    #[test]
    fn nothing_follows_a_terminal_event() {
        let (sink, mut rx) = EventSink::channel("s1");
        let clone = sink.clone();
        assert!(sink.fail("boom"));
        assert!(!clone.emit(ProgressEvent::SummaryDone));
        assert!(!clone.finish());
        assert!(sink.is_closed());

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![ProgressEvent::SessionError {
                message: "boom".into()
            }]
        );
    }

    #[test]
    fn dropped_receiver_closes_sink() {
        let (sink, rx) = EventSink::channel("s1");
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.emit(ProgressEvent::SummaryDone));
        assert_eq!(sink.emitted(), 0);
    }

    #[tokio::test]
    async fn concurrent_emitters_share_one_stream() {
        let (sink, mut rx) = EventSink::channel("s1");
        let mut handles = Vec::new();
        for i in 0..4 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                for n in 0..10 {
                    sink.emit(ProgressEvent::TurnToken {
                        participant_id: format!("p{i}"),
                        turn_id: format!("t{i}"),
                        token: n.to_string(),
                    });
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        sink.finish();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 41);
        assert!(events.last().unwrap().is_terminal());
        // per-turn token order is preserved
        for i in 0..4 {
            let tokens: Vec<String> = events
                .iter()
                .filter_map(|e| match e {
                    ProgressEvent::TurnToken { turn_id, token, .. } if *turn_id == format!("t{i}") => {
                        Some(token.clone())
                    }
                    _ => None,
                })
                .collect();
            let expected: Vec<String> = (0..10).map(|n| n.to_string()).collect();
            assert_eq!(tokens, expected);
        }
    }
}
