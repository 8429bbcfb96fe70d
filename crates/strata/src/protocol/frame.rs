//! Wire frame codec
//!
//! Every frame is a single `data:` line followed by a blank line. Content and
//! error payloads are JSON objects; the sentinel is the literal `[DONE]`.

use serde_json::Value;
use thiserror::Error;

/// Field prefix of every frame line
pub const DATA_PREFIX: &str = "data:";

/// Payload of the terminal frame
pub const DONE_SENTINEL: &str = "[DONE]";

/// A decoded wire event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// A piece of model output to append
    ContentDelta(String),
    /// Normal end of stream
    Done,
    /// The producer gave up; the message is meant for display
    Error(String),
}

impl WireEvent {
    /// Serialize into a complete frame including the blank terminator line
    pub fn encode(&self) -> String {
        let payload = match self {
            WireEvent::ContentDelta(text) => serde_json::json!({ "content": text }).to_string(),
            WireEvent::Error(message) => serde_json::json!({ "error": message }).to_string(),
            WireEvent::Done => DONE_SENTINEL.to_string(),
        };
        format!("{DATA_PREFIX} {payload}\n\n")
    }

    /// True for events after which nothing else is read
    pub fn is_terminal(&self) -> bool {
        matches!(self, WireEvent::Done | WireEvent::Error(_))
    }
}

/// Frame-level decoding failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed frame payload {payload:?}: {reason}")]
    MalformedPayload { payload: String, reason: String },
}

/// How to treat a `data:` line whose payload is not valid JSON
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameMode {
    /// Skip the frame and keep reading
    #[default]
    Lenient,
    /// Abort the session
    Strict,
}

impl FrameMode {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            FrameMode::Strict
        } else {
            FrameMode::Lenient
        }
    }
}

/// Outcome of decoding one piece of raw input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Event(WireEvent),
    /// Terminator lines, comments, other SSE fields, unknown payload shapes
    Ignored,
    /// No line terminator yet
    Incomplete,
}

/// Decode raw input that may or may not contain a full line.
///
/// Only the first line is considered; callers that split lines themselves
/// should use [`decode_line`].
pub fn decode(raw: &str, mode: FrameMode) -> Result<Decoded, FrameError> {
    match raw.split_once('\n') {
        Some((line, _)) => decode_line(line, mode),
        None => Ok(Decoded::Incomplete),
    }
}

/// Decode a single complete line with its `\n` already removed
pub fn decode_line(line: &str, mode: FrameMode) -> Result<Decoded, FrameError> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line.is_empty() || line.starts_with(':') {
        return Ok(Decoded::Ignored);
    }

    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(Decoded::Ignored);
    };
    let data = data.strip_prefix(' ').unwrap_or(data);

    // Sentinel is matched before any JSON parsing
    if data == DONE_SENTINEL {
        return Ok(Decoded::Event(WireEvent::Done));
    }

    match serde_json::from_str::<Value>(data) {
        Ok(value) => Ok(payload_event(&value)
            .map(Decoded::Event)
            .unwrap_or(Decoded::Ignored)),
        Err(e) => match mode {
            FrameMode::Lenient => {
                tracing::debug!(payload = data, error = %e, "Skipping malformed frame");
                Ok(Decoded::Ignored)
            }
            FrameMode::Strict => Err(FrameError::MalformedPayload {
                payload: data.to_string(),
                reason: e.to_string(),
            }),
        },
    }
}

fn payload_event(value: &Value) -> Option<WireEvent> {
    if let Some(content) = value.get("content").and_then(Value::as_str) {
        return Some(WireEvent::ContentDelta(content.to_string()));
    }

    let error = value.get("error")?;
    let message = match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    };
    Some(WireEvent::Error(message))
}
