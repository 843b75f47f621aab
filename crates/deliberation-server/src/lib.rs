//! HTTP transport for live deliberations.
//!
//! | Method | Path                 | Response                                |
//! |--------|----------------------|-----------------------------------------|
//! | POST   | `/api/deliberations` | `text/event-stream` of progress events  |
//! | GET    | `/health`            | JSON status                             |
//!
//! Each SSE message carries the event type as its `event:` name and the
//! tagged JSON event as its `data:` line.

pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/api/deliberations", post(routes::create_deliberation))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
