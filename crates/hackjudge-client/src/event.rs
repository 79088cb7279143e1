//! Typed events decoded from the judging stream.
//!
//! Each stream frame is a JSON object with a `type` discriminator. Only the
//! five event types below are understood; anything else is reported as a
//! [`DecodeError`] and the caller drops the frame.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::DecodeError;
use crate::result::JudgingResult;

/// Summary recorded when an `agent_complete` event carries none.
pub const DEFAULT_SUMMARY: &str = "Analysis complete";

/// Application events carried by the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Agent began working.
    AgentStarted { agent: String },

    /// Progress narration from an agent.
    AgentStep { agent: String, content: String },

    /// Agent finished with a result summary.
    AgentComplete { agent: String, summary: String },

    /// Terminal: the final verdict.
    Verdict { result: JudgingResult },

    /// Terminal: the backend gave up on the job.
    Error { message: String },
}

impl JobEvent {
    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::AgentStarted { .. } => "agent_started",
            JobEvent::AgentStep { .. } => "agent_step",
            JobEvent::AgentComplete { .. } => "agent_complete",
            JobEvent::Verdict { .. } => "verdict",
            JobEvent::Error { .. } => "error",
        }
    }

    /// Agent the event is about, for agent-scoped events.
    pub fn agent(&self) -> Option<&str> {
        match self {
            JobEvent::AgentStarted { agent }
            | JobEvent::AgentStep { agent, .. }
            | JobEvent::AgentComplete { agent, .. } => Some(agent),
            JobEvent::Verdict { .. } | JobEvent::Error { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Verdict { .. } | JobEvent::Error { .. })
    }
}

/// A decoded event together with the optional metadata the backend attaches.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub event: JobEvent,
    /// Server-side timestamp, passed through verbatim.
    pub timestamp: Option<String>,
    /// Display hints for the agent (name, title, icon).
    pub display: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    agent: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    summary: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    timestamp: Option<String>,
    #[serde(default)]
    display: Option<Value>,
}

/// Metadata fields never reject a frame: anything but a string reads as absent.
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

/// Decode one frame payload.
pub fn decode_frame(frame: &str) -> Result<DecodedFrame, DecodeError> {
    let value: Value = serde_json::from_str(frame.trim())
        .map_err(|err| DecodeError::InvalidJson(err.to_string()))?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_owned();

    let raw = RawFrame::deserialize(value).map_err(|err| DecodeError::MalformedFields {
        kind: kind.clone(),
        detail: err.to_string(),
    })?;

    let require = |field: Option<String>, name: &'static str| {
        field.ok_or_else(|| DecodeError::MissingField {
            kind: kind.clone(),
            field: name,
        })
    };

    let event = match kind.as_str() {
        "agent_started" => JobEvent::AgentStarted {
            agent: require(raw.agent, "agent")?,
        },
        "agent_step" => JobEvent::AgentStep {
            agent: require(raw.agent, "agent")?,
            content: require(raw.content, "content")?,
        },
        "agent_complete" => JobEvent::AgentComplete {
            agent: require(raw.agent, "agent")?,
            summary: raw
                .summary
                .filter(|summary| !summary.is_empty())
                .unwrap_or_else(|| DEFAULT_SUMMARY.to_owned()),
        },
        "verdict" => match raw.result {
            Some(result) if !result.is_null() => JobEvent::Verdict {
                result: JudgingResult::new(result),
            },
            _ => {
                return Err(DecodeError::MissingField {
                    kind: kind.clone(),
                    field: "result",
                })
            }
        },
        "error" => JobEvent::Error {
            message: require(raw.message, "message")?,
        },
        _ => return Err(DecodeError::UnknownType { kind: kind.clone() }),
    };

    Ok(DecodedFrame {
        event,
        timestamp: raw.timestamp,
        display: raw.display,
    })
}
