//! Frame parser
//!
//! Turns decoded text into [`ApplicationEvent`]s for one of the three
//! streaming protocols. A malformed frame is logged and dropped; it never
//! ends the stream.

use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::frame::{FrameBuffer, Protocol};
use super::types::{ApplicationEvent, Completion, ComparisonRecord, FrameDecodeError, TaskOutcome};
use crate::types::GeneratedQuestion;

const LOG_PREFIX: &str = "LOG: ";
const DATA_PREFIX: &str = "DATA: ";
const SSE_DONE: &str = "[DONE]";

/// Result of decoding one frame
#[derive(Debug, PartialEq)]
pub enum Decoded {
    Event(ApplicationEvent),
    /// Several events carried by one frame, in render order
    Events(Vec<ApplicationEvent>),
    /// Blank line, keepalive, or a frame carrying nothing to render
    Skip,
}

/// Incremental parser state for one stream
#[derive(Debug)]
pub struct FrameParser {
    protocol: Protocol,
    frames: FrameBuffer,
    /// Set once the SSE `[DONE]` sentinel was seen
    finished: bool,
    dropped: usize,
}

impl FrameParser {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            frames: FrameBuffer::for_protocol(protocol),
            finished: false,
            dropped: 0,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Feed decoded text and return the events of every frame it completed.
    ///
    /// After the SSE sentinel nothing is parsed any more.
    pub fn feed(&mut self, text: &str) -> Vec<ApplicationEvent> {
        let mut events = Vec::new();
        if self.finished {
            trace!("Ignoring {} bytes after end of stream", text.len());
            return events;
        }

        for frame in self.frames.push(text) {
            match decode_frame(self.protocol, &frame) {
                Ok(Decoded::Event(event)) => {
                    let done = event == ApplicationEvent::Done;
                    events.push(event);
                    if done {
                        self.finished = true;
                        break;
                    }
                }
                Ok(Decoded::Events(batch)) => events.extend(batch),
                Ok(Decoded::Skip) => {}
                Err(e) => {
                    self.dropped += 1;
                    warn!("Dropping frame: {}", e);
                }
            }
        }

        if self.finished {
            self.frames.take_tail();
        }
        events
    }

    /// End of input. An unterminated tail is never parsed; it is discarded.
    pub fn finish(&mut self) {
        let tail = self.frames.take_tail();
        if !tail.trim().is_empty() && !self.finished {
            debug!(
                "Discarding unterminated {} frame ({} bytes)",
                self.protocol,
                tail.len()
            );
        }
    }

    /// Whether the stream signalled its own end
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of malformed frames dropped so far
    pub fn dropped_frames(&self) -> usize {
        self.dropped
    }
}

/// Decode one complete frame (delimiter already stripped)
pub fn decode_frame(protocol: Protocol, frame: &str) -> Result<Decoded, FrameDecodeError> {
    match protocol {
        Protocol::Ndjson => decode_ndjson(frame),
        Protocol::PrefixedLog => decode_prefixed(frame),
        Protocol::Sse => decode_sse(frame),
    }
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

// =============================================================================
// NDJSON
// =============================================================================

fn decode_ndjson(line: &str) -> Result<Decoded, FrameDecodeError> {
    let line = strip_cr(line);
    if line.trim().is_empty() {
        return Ok(Decoded::Skip);
    }

    serde_json::from_str::<ComparisonRecord>(line)
        .map(|record| Decoded::Event(ApplicationEvent::Record(Box::new(record))))
        .map_err(|e| FrameDecodeError::new("ndjson", e, line))
}

// =============================================================================
// Prefixed log
// =============================================================================

fn decode_prefixed(line: &str) -> Result<Decoded, FrameDecodeError> {
    let line = strip_cr(line);
    if line.trim().is_empty() {
        return Ok(Decoded::Skip);
    }

    if let Some(message) = line.strip_prefix(LOG_PREFIX) {
        return Ok(Decoded::Event(ApplicationEvent::Log(message.to_string())));
    }

    if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
        return serde_json::from_str::<TaskOutcome>(payload)
            .map(|outcome| Decoded::Event(ApplicationEvent::Outcome(outcome)))
            .map_err(|e| FrameDecodeError::new("prefixed-log", e, line));
    }

    debug!("Skipping untagged log line: {}", line);
    Ok(Decoded::Skip)
}

// =============================================================================
// SSE
// =============================================================================

/// Fields of the generation stream's JSON payload
#[derive(Debug, Deserialize)]
struct SsePayload {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    content: Option<serde_json::Value>,
    /// Raw agent output; stands in for `content` on progress frames
    #[serde(default)]
    stream: Option<serde_json::Value>,
    #[serde(default)]
    completion: Option<serde_json::Value>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

fn decode_sse(block: &str) -> Result<Decoded, FrameDecodeError> {
    let Some(data) = sse_data(block) else {
        return Ok(Decoded::Skip);
    };

    if data.trim() == SSE_DONE {
        return Ok(Decoded::Event(ApplicationEvent::Done));
    }

    let payload: SsePayload =
        serde_json::from_str(&data).map_err(|e| FrameDecodeError::new("sse", e, &data))?;

    let text = || {
        payload
            .content
            .as_ref()
            .or(payload.stream.as_ref())
            .map(value_text)
            .unwrap_or_default()
    };

    let mut events = Vec::with_capacity(2);
    match payload.kind.as_deref() {
        Some("process") => events.push(ApplicationEvent::Process(text())),
        Some("snippet") => events.push(ApplicationEvent::Snippet(text())),
        Some("error") => events.push(ApplicationEvent::Failure(text())),
        None => {}
        Some(other) => debug!("Skipping SSE payload of type {}", other),
    }

    // A frame may carry a typed update and a finished question at once
    if let Some(status) = payload.completion.as_ref().filter(|v| is_truthy(v)) {
        let question = match payload.data {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => match serde_json::from_value::<GeneratedQuestion>(value) {
                Ok(question) => Some(question),
                Err(e) => {
                    warn!("Completion without a usable question: {}", e);
                    None
                }
            },
        };
        events.push(ApplicationEvent::Completion(Completion {
            status: value_text(status),
            question,
        }));
    }

    Ok(match events.len() {
        0 => Decoded::Skip,
        1 => Decoded::Event(events.remove(0)),
        _ => Decoded::Events(events),
    })
}

/// Collect the `data` field of one SSE event block.
///
/// Multiple `data:` lines are joined with newlines; returns `None` when the
/// block carries no data (keepalives, bare `event:` lines).
fn sse_data(block: &str) -> Option<String> {
    let mut data: Option<String> = None;

    for line in block.split('\n').map(strip_cr) {
        if line.is_empty() {
            continue;
        }

        // Comment line (keepalive)
        if line.starts_with(':') {
            trace!("SSE keepalive/comment");
            continue;
        }

        // Split on first colon; skip the optional leading space
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                let buffer = data.get_or_insert_with(String::new);
                if !buffer.is_empty() {
                    buffer.push('\n');
                }
                buffer.push_str(value);
            }
            "event" | "id" => trace!("SSE {}: {}", field, value),
            "retry" => {
                // No reconnection, so the retry hint is ignored
                trace!("SSE retry: {}", value);
            }
            _ => trace!("SSE unknown field: {}", field),
        }
    }

    data.filter(|d| !d.is_empty())
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
