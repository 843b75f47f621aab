//! Client read loop.
//!
//! [`ClientSession`] is the single consumer of one session's event stream.
//! It folds events through [`SessionView::apply`] in arrival order and
//! publishes every new state on a `watch` channel, so any number of observers
//! (a terminal renderer, a test) can follow along without touching the fold.
//!
//! [`RemoteClient`] feeds a server's SSE response through the same loop.

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::engine::DeliberationRequest;
use crate::errors::{DeliberationError, DeliberationResult};
use crate::events::{EventReceiver, ProgressEvent};
use crate::reducer::SessionView;

/// Decode one SSE `data:` payload.
pub fn decode_event(data: &str) -> DeliberationResult<ProgressEvent> {
    serde_json::from_str(data).map_err(|e| DeliberationError::StreamDecode(e.to_string()))
}

/// Final state of a consumed stream.
#[derive(Debug, Clone)]
pub struct ClientOutcome {
    pub view: SessionView,
    /// Every event that was applied, in order.
    pub events: Vec<ProgressEvent>,
    /// Payloads that failed to decode and were dropped.
    pub dropped: usize,
}

pub struct ClientSession {
    view: SessionView,
    events: Vec<ProgressEvent>,
    dropped: usize,
    publisher: watch::Sender<SessionView>,
}

impl ClientSession {
    pub fn new(question: &str) -> (Self, watch::Receiver<SessionView>) {
        let view = SessionView::started(question);
        let (publisher, observer) = watch::channel(view.clone());
        (
            Self {
                view,
                events: Vec::new(),
                dropped: 0,
                publisher,
            },
            observer,
        )
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.view.is_terminal()
    }

    /// Fold one event and publish the new state.
    pub fn apply(&mut self, event: ProgressEvent) {
        let view = std::mem::take(&mut self.view);
        self.view = view.apply(&event);
        self.events.push(event);
        self.publisher.send_replace(self.view.clone());
    }

    /// Decode and fold one raw payload. Malformed payloads are dropped and
    /// consumption continues.
    pub fn apply_data(&mut self, data: &str) -> bool {
        match decode_event(data) {
            Ok(event) => {
                self.apply(event);
                true
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed event");
                self.dropped += 1;
                false
            }
        }
    }

    /// Consume events until a terminal one arrives or the stream ends.
    pub async fn consume<S>(mut self, stream: S) -> ClientOutcome
    where
        S: Stream<Item = ProgressEvent>,
    {
        let mut stream = std::pin::pin!(stream);
        while let Some(event) = stream.next().await {
            self.apply(event);
            if self.is_finished() {
                break;
            }
        }
        self.finish()
    }

    /// Consume an in-process event receiver.
    pub async fn consume_receiver(self, receiver: EventReceiver) -> ClientOutcome {
        self.consume(tokio_stream::wrappers::UnboundedReceiverStream::new(receiver))
            .await
    }

    fn finish(mut self) -> ClientOutcome {
        if !self.is_finished() {
            // Stream ended without a terminal event: the connection dropped.
            self.apply(ProgressEvent::SessionError {
                message: "Connection closed before the session finished".to_string(),
            });
        }
        ClientOutcome {
            view: self.view,
            events: self.events,
            dropped: self.dropped,
        }
    }
}

/// HTTP client for a running deliberation server.
#[derive(Clone)]
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Start a session on the server and fold its stream into `session`.
    pub async fn run(
        &self,
        request: &DeliberationRequest,
        mut session: ClientSession,
    ) -> DeliberationResult<ClientOutcome> {
        let url = format!("{}/api/deliberations", self.base_url);
        debug!(%url, "Starting remote deliberation");

        let response = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| DeliberationError::Internal(anyhow::anyhow!("request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliberationError::Validation(body));
        }
        if !status.is_success() {
            return Err(DeliberationError::Internal(anyhow::anyhow!(
                "server returned {status}"
            )));
        }

        let mut events = response
            .bytes_stream()
            .map(|r| r.map_err(std::io::Error::other))
            .eventsource();

        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    if event.data.is_empty() {
                        continue;
                    }
                    session.apply_data(&event.data);
                    if session.is_finished() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Event stream interrupted");
                    break;
                }
            }
        }

        Ok(session.finish())
    }
}
