use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use deliberation::{DeliberationRequest, ProgressEvent};

use crate::error::AppError;
use crate::state::AppState;

pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn to_sse_event(event: &ProgressEvent) -> Result<Event, Infallible> {
    Ok(Event::default()
        .event(event.event_type())
        .data(event.to_json()))
}

/// Cancel `cancel` once `budget` elapses, unless it is cancelled first.
fn arm_budget(session_id: String, cancel: CancellationToken, budget: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(budget) => {
                warn!(%session_id, budget_secs = budget.as_secs(), "Session exceeded its time budget");
                cancel.cancel();
            }
        }
    });
}

/// Start a deliberation and stream its progress events.
///
/// Validation failures are answered with 400 before the stream opens. Once
/// open, the stream carries every event up to and including the terminal
/// one. Dropping the connection cancels the session.
pub async fn create_deliberation(
    State(state): State<AppState>,
    Json(request): Json<DeliberationRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let handle = state.engine.start(request)?;
    let session_id = handle.session_id.clone();
    info!(%session_id, "Streaming deliberation");

    let (events, cancel) = handle.into_parts();
    arm_budget(session_id, cancel.clone(), state.budget);

    let guard = cancel.drop_guard();
    let stream = UnboundedReceiverStream::new(events).map(move |event| {
        let _guard = &guard;
        to_sse_event(&event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE_INTERVAL)))
}
