//! Deliberation error taxonomy.
//!
//! Every failure in the engine is represented here. Callers classify with
//! `category()` instead of string matching.
//!
//! ## Categories
//!
//! | Category     | Session effect                   | Surfaces as                |
//! |--------------|----------------------------------|----------------------------|
//! | Validation   | rejected before any event        | HTTP 400, no stream        |
//! | Upstream     | session aborted                  | one `session_error` event  |
//! | Lookup       | none, session continues          | log line only              |
//! | Decode       | single event dropped             | log line only              |
//! | Cancelled    | session aborted                  | stream closed              |
//! | Internal     | session aborted                  | one `session_error` event  |
//!
//! Nothing is retried at any granularity: a failed session is restarted
//! wholesale by the caller.

use std::fmt;

use thiserror::Error;

/// Classification used by the engine and the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad request input: no session was started.
    Validation,
    /// A generation call failed, fatal to the session.
    Upstream,
    /// Web lookup failed, swallowed.
    Lookup,
    /// A malformed event reached the client, dropped.
    Decode,
    /// The session was cancelled by reset or disconnect.
    Cancelled,
    /// Anything else.
    Internal,
}

impl ErrorCategory {
    /// Whether an error of this category ends the session.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Upstream | Self::Cancelled | Self::Internal)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Upstream => write!(f, "upstream"),
            Self::Lookup => write!(f, "lookup"),
            Self::Decode => write!(f, "decode"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Failure reported by a `GenerationService` implementation.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error("structured output did not match schema `{schema}`: {message}")]
    Schema { schema: String, message: String },
}

/// Failure reported by a `WebLookup` implementation.
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    #[error("lookup not configured")]
    NotConfigured,

    #[error("lookup request failed: {0}")]
    Request(String),

    #[error("lookup returned {status}")]
    Status { status: u16 },
}

/// Unified error type for all deliberation operations.
#[derive(Debug, Error)]
pub enum DeliberationError {
    /// The request was rejected before any session started.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A turn, summary, persona or verdict generation call failed.
    #[error("Generation failed during {stage}: {source}")]
    UpstreamGeneration {
        stage: String,
        #[source]
        source: GenerationError,
    },

    /// The optional web lookup failed.
    #[error("Web lookup failed: {0}")]
    UpstreamLookup(#[from] LookupError),

    /// A malformed event chunk reached the client.
    #[error("Malformed event: {0}")]
    StreamDecode(String),

    /// The session was cancelled.
    #[error("Session cancelled")]
    Cancelled,

    /// A captured event log broke an ordering rule.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Any other error that doesn't fit the above categories.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DeliberationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::UpstreamGeneration { .. } => ErrorCategory::Upstream,
            Self::UpstreamLookup(_) => ErrorCategory::Lookup,
            Self::StreamDecode(_) => ErrorCategory::Decode,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Protocol(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Wrap a generation failure with the stage it happened in.
    pub fn generation(stage: impl Into<String>, source: GenerationError) -> Self {
        Self::UpstreamGeneration {
            stage: stage.into(),
            source,
        }
    }

    /// Message shown to the end consumer in a `session_error` event.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

pub type DeliberationResult<T> = Result<T, DeliberationError>;
