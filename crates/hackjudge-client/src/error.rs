//! Error types for the judging client

use thiserror::Error;

use crate::state::Phase;

/// Longest server error body kept in an [`ApiError::Status`] message.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Errors raised by the HTTP transport
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request could not be sent or the connection failed mid-body
    #[error("HTTP error: {0}")]
    Http(String),

    /// Backend answered with a non-success status
    #[error("server error: {status}{}", format_body(.body))]
    Status { status: u16, body: String },

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (reading evidence attachments)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Evidence bundle is missing a required field
    #[error("invalid evidence: {0}")]
    InvalidEvidence(String),
}

impl ApiError {
    /// Build a status error, collapsing whitespace and truncating the body.
    pub fn status(status: u16, body: &str) -> Self {
        ApiError::Status {
            status,
            body: sanitize_error_body(body),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Http(err.to_string())
    }
}

fn format_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" ({body})")
    }
}

fn sanitize_error_body(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_ERROR_BODY_CHARS {
        collapsed
    } else {
        let mut truncated: String = collapsed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        truncated.push_str("...");
        truncated
    }
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Reasons a stream frame was discarded.
///
/// These never leave the client: a dropped frame is logged and the stream
/// keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no type discriminator")]
    MissingType,

    #[error("unknown event type: {kind}")]
    UnknownType { kind: String },

    #[error("event {kind} missing required field: {field}")]
    MissingField { kind: String, field: &'static str },

    #[error("event {kind} has malformed fields: {detail}")]
    MalformedFields { kind: String, detail: String },
}

/// Triggers the job phase machine refuses in its current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    #[error("a job is already {phase}; reset before submitting again")]
    JobInFlight { phase: Phase },

    #[error("{trigger} is not valid while {phase}")]
    InvalidTransition { phase: Phase, trigger: &'static str },
}

/// Errors returned by a [`SessionHandle`](crate::session::SessionHandle).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("judging session has shut down")]
    Closed,
}
