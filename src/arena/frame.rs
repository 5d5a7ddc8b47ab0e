// src/arena/frame.rs
use serde::Deserialize;

use super::{DebateTurn, SpeakerRole};

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

/// What a single line of the event stream means for the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Turn(DebateTurn),
    /// End of the debate.
    Done,
    /// The service reported a failure for this step.
    Error(String),
    /// A data payload that is not valid JSON.
    Malformed(String),
    /// Blank lines, non-data fields and payloads without a usable turn.
    Ignored,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

fn error_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::Null | serde_json::Value::Bool(false) => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::Number(n) if n.as_f64() == Some(0.0) => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Classify one line (without its terminator).
pub fn parse_frame(line: &str) -> Frame {
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Ignored;
    };
    let payload = rest.strip_prefix(' ').unwrap_or(rest);

    if payload.trim() == DONE_SENTINEL {
        return Frame::Done;
    }
    if payload.trim().is_empty() {
        return Frame::Ignored;
    }

    let raw: RawPayload = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => return Frame::Malformed(e.to_string()),
    };

    if let Some(msg) = raw.error.as_ref().and_then(error_text) {
        return Frame::Error(msg);
    }

    let role = raw.role.as_deref().filter(|r| !r.is_empty());
    let content = raw.content.filter(|c| !c.is_empty());
    let (Some(role), Some(content)) = (role, content) else {
        return Frame::Ignored;
    };

    match SpeakerRole::from_wire(role) {
        Some(role) => Frame::Turn(DebateTurn {
            role,
            name: raw.name.unwrap_or_default(),
            content,
        }),
        None => {
            tracing::warn!(target: "arena", role, "turn with unknown speaker role dropped");
            Frame::Ignored
        }
    }
}
